use chrono::NaiveDate;
use itertools::Itertools;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{KpiError, Result};
use crate::load::{BATCH_COL, DATE_COL, OPERATOR_COL, PRODUCT_COL};

/// Inclusive date window plus optional category constraints.
///
/// An absent product or operator imposes no constraint; there is no "All"
/// sentinel value that could collide with a real category name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub product: Option<String>,
    pub operator: Option<String>,
}

impl Selection {
    /// Default selection: the full observed date span, no category
    /// constraints.
    pub fn full_range(batches: &DataFrame) -> Result<Self> {
        let (start, end) = date_bounds(batches)?;
        Ok(Self {
            start,
            end,
            product: None,
            operator: None,
        })
    }

    /// Batch rows matching the selection. Rows with a null date never match.
    pub fn filter_batches(&self, batches: &DataFrame) -> Result<DataFrame> {
        Ok(batches.clone().lazy().filter(self.predicate()).collect()?)
    }

    /// Joined downtime rows matching the selection; events whose batch id
    /// matched nothing carry null metadata and are excluded here.
    pub fn filter_downtime(&self, downtime_view: &DataFrame) -> Result<DataFrame> {
        Ok(downtime_view
            .clone()
            .lazy()
            .filter(self.predicate())
            .collect()?)
    }

    fn predicate(&self) -> Expr {
        let mut expr = col(DATE_COL)
            .gt_eq(date_lit(self.start))
            .and(col(DATE_COL).lt_eq(date_lit(self.end)));
        if let Some(product) = &self.product {
            expr = expr.and(col(PRODUCT_COL).eq(lit(product.as_str())));
        }
        if let Some(operator) = &self.operator {
            expr = expr.and(col(OPERATOR_COL).eq(lit(operator.as_str())));
        }
        expr
    }
}

/// Observed min/max of the date column. Fails when no row carries a
/// readable date, which leaves every downstream view undefined.
pub fn date_bounds(batches: &DataFrame) -> Result<(NaiveDate, NaiveDate)> {
    let dates = batches.column(DATE_COL)?.date()?;
    match (dates.min(), dates.max()) {
        (Some(min), Some(max)) => Ok((date_from_days(min), date_from_days(max))),
        _ => Err(KpiError::DateBounds),
    }
}

/// Downtime events with batch metadata attached: a left join on the batch id
/// brings in date, product and operator for filtering. Events whose batch id
/// matches no batch keep null metadata.
pub fn join_downtime(batches: &DataFrame, downtime: &DataFrame) -> Result<DataFrame> {
    let meta = batches.clone().lazy().select([
        col(BATCH_COL),
        col(DATE_COL),
        col(PRODUCT_COL),
        col(OPERATOR_COL),
    ]);
    let joined = downtime
        .clone()
        .lazy()
        .join(
            meta,
            [col(BATCH_COL)],
            [col(BATCH_COL)],
            JoinArgs::new(JoinType::Left),
        )
        .collect()?;
    Ok(joined)
}

/// Sorted distinct non-null products, for the presentation layer's selector.
pub fn product_options(batches: &DataFrame) -> Result<Vec<String>> {
    distinct_strings(batches, PRODUCT_COL)
}

/// Sorted distinct non-null operators, for the presentation layer's selector.
pub fn operator_options(batches: &DataFrame) -> Result<Vec<String>> {
    distinct_strings(batches, OPERATOR_COL)
}

fn distinct_strings(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    Ok(df
        .column(name)?
        .str()?
        .into_iter()
        .flatten()
        .unique()
        .map(|value| value.to_string())
        .sorted()
        .collect())
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
}

pub(crate) fn date_from_days(days: i32) -> NaiveDate {
    epoch() + chrono::Duration::days(days as i64)
}

fn days_from_date(date: NaiveDate) -> i32 {
    date.signed_duration_since(epoch()).num_days() as i32
}

/// Literal usable in comparisons against a `Date` column.
fn date_lit(date: NaiveDate) -> Expr {
    lit(days_from_date(date)).cast(DataType::Date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn sample_batches() -> DataFrame {
        let df = df![
            DATE_COL => ["2024-01-01", "2024-01-02", "2024-01-03"],
            BATCH_COL => [1i64, 2, 3],
            PRODUCT_COL => ["Widget", "Gadget", "Widget"],
            OPERATOR_COL => ["Ana", "Bo", "Ana"],
        ]
        .unwrap();
        df.lazy()
            .with_columns([col(DATE_COL).str().to_date(StrptimeOptions {
                format: Some("%Y-%m-%d".into()),
                strict: false,
                ..Default::default()
            })])
            .collect()
            .unwrap()
    }

    #[test]
    fn date_days_roundtrip() {
        let d = date("2024-02-29");
        assert_eq!(date_from_days(days_from_date(d)), d);
        assert_eq!(days_from_date(epoch()), 0);
    }

    #[test]
    fn full_range_has_no_category_constraints() {
        let batches = sample_batches();
        let selection = Selection::full_range(&batches).unwrap();
        assert_eq!(selection.start, date("2024-01-01"));
        assert_eq!(selection.end, date("2024-01-03"));
        assert!(selection.product.is_none());
        assert!(selection.operator.is_none());

        let filtered = selection.filter_batches(&batches).unwrap();
        assert!(filtered.equals_missing(&batches));
    }

    #[test]
    fn date_window_is_inclusive() {
        let batches = sample_batches();
        let selection = Selection {
            start: date("2024-01-02"),
            end: date("2024-01-03"),
            product: None,
            operator: None,
        };
        let filtered = selection.filter_batches(&batches).unwrap();
        assert_eq!(filtered.height(), 2);
    }

    #[test]
    fn category_constraints_combine_with_date_window() {
        let batches = sample_batches();
        let selection = Selection {
            start: date("2024-01-01"),
            end: date("2024-01-03"),
            product: Some("Widget".to_string()),
            operator: Some("Ana".to_string()),
        };
        let filtered = selection.filter_batches(&batches).unwrap();
        assert_eq!(filtered.height(), 2);

        let nobody = Selection {
            operator: Some("Cy".to_string()),
            ..selection
        };
        assert_eq!(nobody.filter_batches(&batches).unwrap().height(), 0);
    }

    #[test]
    fn option_lists_are_sorted_and_distinct() {
        let batches = sample_batches();
        assert_eq!(product_options(&batches).unwrap(), vec!["Gadget", "Widget"]);
        assert_eq!(operator_options(&batches).unwrap(), vec!["Ana", "Bo"]);
    }

    #[test]
    fn date_bounds_fail_without_readable_dates() {
        let df = df![
            DATE_COL => ["not-a-date", "also bad"],
            BATCH_COL => [1i64, 2],
        ]
        .unwrap();
        let df = df
            .lazy()
            .with_columns([col(DATE_COL).str().to_date(StrptimeOptions {
                format: Some("%Y-%m-%d".into()),
                strict: false,
                ..Default::default()
            })])
            .collect()
            .unwrap();

        assert!(matches!(date_bounds(&df), Err(KpiError::DateBounds)));
    }
}
