use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::load::{
    ACTUAL_RUN_COL, BATCH_COL, DATE_COL, DESCRIPTION_COL, DOWNTIME_MIN_COL, DOWNTIME_RATE_COL,
    DOWNTIME_TOTAL_COL, DURATION_COL, OPERATOR_COL, PRODUCT_COL, RUN_RATIO_COL,
};

/// Cap on Pareto entries.
pub const TOP_REASONS: usize = 12;
/// Cap on worst-batch table rows.
pub const WORST_BATCH_ROWS: usize = 15;

// daily rollup columns
pub const DAY_COL: &str = "day";
pub const TOTAL_DOWNTIME_COL: &str = "total_downtime";
pub const AVG_RATE_COL: &str = "avg_downtime_rate";
pub const AVG_DURATION_COL: &str = "avg_duration";

/// Column subset of the worst-batch table, in display order.
pub const WORST_COLUMNS: [&str; 8] = [
    DATE_COL,
    BATCH_COL,
    PRODUCT_COL,
    OPERATOR_COL,
    DURATION_COL,
    DOWNTIME_TOTAL_COL,
    DOWNTIME_RATE_COL,
    ACTUAL_RUN_COL,
];

/// Scalar headline figures over the filtered batch table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
    pub total_downtime_min: f64,
    pub avg_downtime_rate: f64,
    pub avg_run_ratio: f64,
    pub batch_count: u32,
}

/// Headline KPIs. The run ratio prefers the precomputed column and falls
/// back to the per-row `actual_run_min / duration_min` mean; the batch count
/// is over distinct non-null ids.
pub fn compute_kpis(batches: &DataFrame) -> Result<Kpis> {
    let has_ratio = batches
        .get_column_names()
        .iter()
        .any(|name| *name == RUN_RATIO_COL);
    let run_ratio = if has_ratio {
        col(RUN_RATIO_COL).mean()
    } else {
        (col(ACTUAL_RUN_COL) / col(DURATION_COL)).mean()
    };

    let out = batches
        .clone()
        .lazy()
        .select([
            col(DOWNTIME_TOTAL_COL)
                .cast(DataType::Float64)
                .sum()
                .alias("total_downtime_min"),
            col(DOWNTIME_RATE_COL).mean().alias("avg_downtime_rate"),
            run_ratio.alias("avg_run_ratio"),
            col(BATCH_COL)
                .drop_nulls()
                .n_unique()
                .alias("batch_count"),
        ])
        .collect()?;

    Ok(Kpis {
        total_downtime_min: scalar_f64(&out, "total_downtime_min")?,
        avg_downtime_rate: scalar_f64(&out, "avg_downtime_rate")?,
        avg_run_ratio: scalar_f64(&out, "avg_run_ratio")?,
        batch_count: scalar_u32(&out, "batch_count")?,
    })
}

/// One row per calendar day: summed downtime, mean rate, mean duration,
/// ascending by day.
pub fn daily_rollup(batches: &DataFrame) -> Result<DataFrame> {
    Ok(batches
        .clone()
        .lazy()
        .group_by([col(DATE_COL).alias(DAY_COL)])
        .agg([
            col(DOWNTIME_TOTAL_COL)
                .cast(DataType::Float64)
                .sum()
                .alias(TOTAL_DOWNTIME_COL),
            col(DOWNTIME_RATE_COL).mean().alias(AVG_RATE_COL),
            col(DURATION_COL).mean().alias(AVG_DURATION_COL),
        ])
        .sort_by_exprs(vec![col(DAY_COL)], SortMultipleOptions::default())
        .collect()?)
}

/// Summed downtime minutes per reason description, largest first, truncated
/// to the top [`TOP_REASONS`] entries. Rows without a description are
/// dropped.
pub fn reason_totals(downtime: &DataFrame) -> Result<DataFrame> {
    Ok(downtime
        .clone()
        .lazy()
        .filter(col(DESCRIPTION_COL).is_not_null())
        .group_by([col(DESCRIPTION_COL)])
        .agg([col(DOWNTIME_MIN_COL).cast(DataType::Float64).sum()])
        .sort_by_exprs(
            vec![col(DOWNTIME_MIN_COL)],
            SortMultipleOptions::default().with_order_descending(true),
        )
        .limit(TOP_REASONS as u32)
        .collect()?)
}

/// Highest-downtime batches, projected to the fixed display columns, at most
/// [`WORST_BATCH_ROWS`] rows.
pub fn worst_batches(batches: &DataFrame) -> Result<DataFrame> {
    let columns: Vec<Expr> = WORST_COLUMNS.iter().map(|name| col(name)).collect();
    Ok(batches
        .clone()
        .lazy()
        .sort_by_exprs(
            vec![col(DOWNTIME_TOTAL_COL)],
            SortMultipleOptions::default().with_order_descending(true),
        )
        .select(columns)
        .limit(WORST_BATCH_ROWS as u32)
        .collect()?)
}

fn scalar_f64(df: &DataFrame, name: &str) -> Result<f64> {
    Ok(df.column(name)?.f64()?.get(0).unwrap_or(f64::NAN))
}

fn scalar_u32(df: &DataFrame, name: &str) -> Result<u32> {
    Ok(df.column(name)?.u32()?.get(0).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kpi_fixture() -> DataFrame {
        df![
            DATE_COL => ["2024-01-01", "2024-01-01"],
            BATCH_COL => [1i64, 2],
            PRODUCT_COL => ["Widget", "Widget"],
            OPERATOR_COL => ["Ana", "Bo"],
            DURATION_COL => [100.0, 100.0],
            ACTUAL_RUN_COL => [90.0, 80.0],
            DOWNTIME_TOTAL_COL => [30.0, 10.0],
            DOWNTIME_RATE_COL => [0.1, 0.2],
        ]
        .unwrap()
    }

    #[test]
    fn kpis_over_one_day() {
        let kpis = compute_kpis(&kpi_fixture()).unwrap();
        assert_eq!(kpis.total_downtime_min, 40.0);
        assert!((kpis.avg_downtime_rate - 0.15).abs() < 1e-12);
        assert_eq!(kpis.batch_count, 2);
        // no run_ratio column: falls back to actual_run / duration
        assert!((kpis.avg_run_ratio - 0.85).abs() < 1e-12);
    }

    #[test]
    fn kpis_prefer_precomputed_run_ratio() {
        let df = kpi_fixture()
            .lazy()
            .with_columns([lit(0.5).alias(RUN_RATIO_COL)])
            .collect()
            .unwrap();
        let kpis = compute_kpis(&df).unwrap();
        assert_eq!(kpis.avg_run_ratio, 0.5);
    }

    #[test]
    fn batch_count_ignores_null_ids() {
        let df = df![
            BATCH_COL => [Some(7i64), Some(7), None],
            DURATION_COL => [10.0, 10.0, 10.0],
            ACTUAL_RUN_COL => [9.0, 9.0, 9.0],
            DOWNTIME_TOTAL_COL => [1.0, 1.0, 1.0],
            DOWNTIME_RATE_COL => [0.1, 0.1, 0.1],
        ]
        .unwrap();
        assert_eq!(compute_kpis(&df).unwrap().batch_count, 1);
    }

    #[test]
    fn rollup_has_one_row_per_day_with_recomputed_values() {
        let df = df![
            DATE_COL => ["2024-01-02", "2024-01-01", "2024-01-02"],
            BATCH_COL => [1i64, 2, 3],
            DURATION_COL => [100.0, 50.0, 60.0],
            DOWNTIME_TOTAL_COL => [10.0, 20.0, 30.0],
            DOWNTIME_RATE_COL => [0.1, 0.4, 0.5],
        ]
        .unwrap();
        let daily = daily_rollup(&df).unwrap();
        assert_eq!(daily.height(), 2);

        let days: Vec<_> = daily
            .column(DAY_COL)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(days, vec!["2024-01-01", "2024-01-02"]);

        let totals: Vec<_> = daily
            .column(TOTAL_DOWNTIME_COL)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(totals, vec![20.0, 40.0]);

        let rates: Vec<_> = daily
            .column(AVG_RATE_COL)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(rates, vec![0.4, 0.3]);

        let durations: Vec<_> = daily
            .column(AVG_DURATION_COL)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(durations, vec![50.0, 80.0]);
    }

    #[test]
    fn reason_totals_are_bounded_sorted_and_skip_null_descriptions() {
        let count = 20usize;
        let descriptions: Vec<Option<String>> = (0..count)
            .map(|i| {
                if i % 5 == 4 {
                    None
                } else {
                    Some(format!("Reason {i}"))
                }
            })
            .collect();
        let minutes: Vec<f64> = (0..count).map(|i| i as f64).collect();
        let df = df![
            DESCRIPTION_COL => descriptions,
            DOWNTIME_MIN_COL => minutes,
        ]
        .unwrap();

        let reasons = reason_totals(&df).unwrap();
        assert_eq!(reasons.height(), TOP_REASONS);

        let sums: Vec<_> = reasons
            .column(DOWNTIME_MIN_COL)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert!(sums.windows(2).all(|pair| pair[0] >= pair[1]));
        // the largest null-description row (19.0) must not appear
        assert_eq!(sums[0], 18.0);
    }

    #[test]
    fn worst_batches_are_bounded_sorted_and_projected() {
        let count = 20usize;
        let dates: Vec<String> = (0..count).map(|i| format!("2024-01-{:02}", i + 1)).collect();
        let ids: Vec<i64> = (0..count as i64).collect();
        let products: Vec<&str> = (0..count).map(|_| "Widget").collect();
        let operators: Vec<&str> = (0..count).map(|_| "Ana").collect();
        let durations: Vec<f64> = (0..count).map(|_| 100.0).collect();
        let runs: Vec<f64> = (0..count).map(|_| 90.0).collect();
        let downtime: Vec<f64> = (0..count).map(|i| i as f64).collect();
        let rates: Vec<f64> = (0..count).map(|i| i as f64 / 100.0).collect();
        let df = df![
            DATE_COL => dates,
            BATCH_COL => ids,
            PRODUCT_COL => products,
            OPERATOR_COL => operators,
            DURATION_COL => durations,
            ACTUAL_RUN_COL => runs,
            DOWNTIME_TOTAL_COL => downtime,
            DOWNTIME_RATE_COL => rates,
        ]
        .unwrap();

        let worst = worst_batches(&df).unwrap();
        assert_eq!(worst.height(), WORST_BATCH_ROWS);
        assert_eq!(worst.get_column_names(), WORST_COLUMNS.to_vec());

        let values: Vec<_> = worst
            .column(DOWNTIME_TOTAL_COL)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert!(values.windows(2).all(|pair| pair[0] >= pair[1]));
        assert_eq!(values[0], 19.0);
    }
}
