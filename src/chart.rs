use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::aggregate::{AVG_RATE_COL, DAY_COL, TOTAL_DOWNTIME_COL};
use crate::error::Result;
use crate::filter::date_from_days;
use crate::load::{DESCRIPTION_COL, DOWNTIME_MIN_COL};

/// Ceiling of the Pareto secondary axis; headroom above 100%.
pub const PARETO_AXIS_MAX: f64 = 1.05;

/// Renderer-agnostic line chart over calendar days.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineChart {
    pub title: String,
    pub x: Vec<NaiveDate>,
    pub y: Vec<Option<f64>>,
    pub markers: bool,
    /// Format the y axis as percentages.
    pub percent_axis: bool,
}

/// Combined bar+line Pareto model. The bar series is `minutes` per reason;
/// the line series is the cumulative share on a secondary axis sharing the
/// same categories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParetoChart {
    /// Reason descriptions in descending-minutes order; renderers must keep
    /// this order, never re-sort.
    pub reasons: Vec<String>,
    pub minutes: Vec<f64>,
    /// Running share of the plotted total, 0..=1, shown as percentages.
    pub cumulative: Vec<f64>,
    pub secondary_axis_max: f64,
}

/// Daily total downtime, ascending by day.
pub fn daily_downtime_chart(daily: &DataFrame) -> Result<LineChart> {
    Ok(LineChart {
        title: "Daily Total Downtime (min)".to_string(),
        x: day_values(daily)?,
        y: column_values(daily, TOTAL_DOWNTIME_COL)?,
        markers: true,
        percent_axis: false,
    })
}

/// Daily mean downtime rate, ascending by day.
pub fn daily_rate_chart(daily: &DataFrame) -> Result<LineChart> {
    Ok(LineChart {
        title: "Daily Avg Downtime Rate".to_string(),
        x: day_values(daily)?,
        y: column_values(daily, AVG_RATE_COL)?,
        markers: true,
        percent_axis: true,
    })
}

/// Pareto model from the reason aggregate, or `None` when no reasons
/// survived the filter; only this panel goes dark in that case.
pub fn build_pareto(reason_totals: &DataFrame) -> Result<Option<ParetoChart>> {
    if reason_totals.height() == 0 {
        return Ok(None);
    }

    let reasons: Vec<String> = reason_totals
        .column(DESCRIPTION_COL)?
        .str()?
        .into_iter()
        .map(|value| value.unwrap_or_default().to_string())
        .collect();
    let minutes: Vec<f64> = reason_totals
        .column(DOWNTIME_MIN_COL)?
        .f64()?
        .into_iter()
        .map(|value| value.unwrap_or(0.0))
        .collect();

    Ok(Some(ParetoChart {
        cumulative: cumulative_fractions(&minutes),
        reasons,
        minutes,
        secondary_axis_max: PARETO_AXIS_MAX,
    }))
}

/// Running sum divided by the grand total of the plotted entries; all zeros
/// when the total is zero.
fn cumulative_fractions(minutes: &[f64]) -> Vec<f64> {
    let total: f64 = minutes.iter().sum();
    if total == 0.0 {
        return vec![0.0; minutes.len()];
    }
    let mut running = 0.0;
    minutes
        .iter()
        .map(|m| {
            running += m;
            running / total
        })
        .collect()
}

fn day_values(daily: &DataFrame) -> Result<Vec<NaiveDate>> {
    Ok(daily
        .column(DAY_COL)?
        .date()?
        .into_iter()
        .flatten()
        .map(date_from_days)
        .collect())
}

fn column_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    Ok(df.column(name)?.f64()?.into_iter().collect())
}
