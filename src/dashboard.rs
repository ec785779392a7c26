use chrono::NaiveDate;
use polars::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::aggregate::{self, Kpis};
use crate::chart::{self, LineChart, ParetoChart};
use crate::error::{KpiError, Result};
use crate::filter::{self, Selection};
use crate::load::{
    ACTUAL_RUN_COL, BATCH_COL, DATE_COL, DOWNTIME_RATE_COL, DOWNTIME_TOTAL_COL, DURATION_COL,
    OPERATOR_COL, PRODUCT_COL, SourceTables,
};

/// Everything one interaction renders: headline KPIs, the two daily trend
/// charts, the Pareto panel and the worst-batch table.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub selection: Selection,
    pub kpis: Kpis,
    pub daily_downtime: LineChart,
    pub daily_rate: LineChart,
    /// `None` when the selection leaves no downtime reasons; the other
    /// panels still render.
    pub pareto: Option<ParetoChart>,
    pub worst_batches: Vec<WorstBatch>,
}

/// One row of the worst-batch table.
#[derive(Debug, Clone, Serialize)]
pub struct WorstBatch {
    pub date: Option<NaiveDate>,
    pub batch: Option<i64>,
    pub product: Option<String>,
    pub operator: Option<String>,
    pub duration_min: Option<f64>,
    pub downtime_total_min: Option<f64>,
    pub downtime_rate: Option<f64>,
    pub actual_run_min: Option<f64>,
}

/// One full interaction: filter both tables, then aggregate and build every
/// panel. An empty batch selection aborts with [`KpiError::EmptySelection`]
/// before any aggregation; an empty reason aggregate only suppresses the
/// Pareto panel.
pub fn build_dashboard(tables: &SourceTables, selection: &Selection) -> Result<Dashboard> {
    let batches = selection.filter_batches(&tables.batches)?;
    if batches.height() == 0 {
        return Err(KpiError::EmptySelection);
    }
    debug!("selection matches {} batch rows", batches.height());

    let downtime_view = filter::join_downtime(&tables.batches, &tables.downtime)?;
    let downtime = selection.filter_downtime(&downtime_view)?;

    let kpis = aggregate::compute_kpis(&batches)?;
    let daily = aggregate::daily_rollup(&batches)?;
    let daily_downtime = chart::daily_downtime_chart(&daily)?;
    let daily_rate = chart::daily_rate_chart(&daily)?;

    let reasons = aggregate::reason_totals(&downtime)?;
    let pareto = chart::build_pareto(&reasons)?;
    if pareto.is_none() {
        debug!("no downtime reasons in selection; pareto panel suppressed");
    }

    let worst = aggregate::worst_batches(&batches)?;
    let worst_batches = worst_rows(&worst)?;

    Ok(Dashboard {
        selection: selection.clone(),
        kpis,
        daily_downtime,
        daily_rate,
        pareto,
        worst_batches,
    })
}

fn worst_rows(df: &DataFrame) -> Result<Vec<WorstBatch>> {
    let mut rows = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        rows.push(WorstBatch {
            date: date_at(df, DATE_COL, idx)?,
            batch: int_at(df, BATCH_COL, idx)?,
            product: str_at(df, PRODUCT_COL, idx)?,
            operator: str_at(df, OPERATOR_COL, idx)?,
            duration_min: float_at(df, DURATION_COL, idx)?,
            downtime_total_min: float_at(df, DOWNTIME_TOTAL_COL, idx)?,
            downtime_rate: float_at(df, DOWNTIME_RATE_COL, idx)?,
            actual_run_min: float_at(df, ACTUAL_RUN_COL, idx)?,
        });
    }
    Ok(rows)
}

fn date_at(df: &DataFrame, name: &str, idx: usize) -> Result<Option<NaiveDate>> {
    match df.column(name)?.get(idx)? {
        AnyValue::Date(days) => Ok(Some(filter::date_from_days(days))),
        _ => Ok(None),
    }
}

fn str_at(df: &DataFrame, name: &str, idx: usize) -> Result<Option<String>> {
    match df.column(name)?.get(idx)? {
        AnyValue::String(value) => Ok(Some(value.to_string())),
        AnyValue::StringOwned(value) => Ok(Some(value.to_string())),
        _ => Ok(None),
    }
}

fn int_at(df: &DataFrame, name: &str, idx: usize) -> Result<Option<i64>> {
    let value = df.column(name)?.get(idx)?;
    if value.is_null() {
        return Ok(None);
    }
    Ok(value.try_extract::<i64>().ok())
}

fn float_at(df: &DataFrame, name: &str, idx: usize) -> Result<Option<f64>> {
    let value = df.column(name)?.get(idx)?;
    if value.is_null() {
        return Ok(None);
    }
    Ok(value.try_extract::<f64>().ok())
}
