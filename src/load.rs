use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::{debug, info};

use crate::error::{KpiError, Result};

pub const DATA_DIR: &str = "data_processed";
pub const BATCHES_FILE: &str = "fact_batches.parquet";
pub const DOWNTIME_FILE: &str = "fact_downtime_long.parquet";

// fact_batches columns
pub const DATE_COL: &str = "Date";
pub const BATCH_COL: &str = "Batch";
pub const PRODUCT_COL: &str = "Product";
pub const OPERATOR_COL: &str = "Operator";
pub const DURATION_COL: &str = "duration_min";
pub const ACTUAL_RUN_COL: &str = "actual_run_min";
pub const DOWNTIME_TOTAL_COL: &str = "downtime_total_min";
pub const DOWNTIME_RATE_COL: &str = "downtime_rate";
pub const RUN_RATIO_COL: &str = "run_ratio";

// fact_downtime_long columns
pub const DESCRIPTION_COL: &str = "Description";
pub const DOWNTIME_MIN_COL: &str = "downtime_min";

/// The two normalized source tables for one project root.
#[derive(Debug, Clone)]
pub struct SourceTables {
    pub batches: DataFrame,
    pub downtime: DataFrame,
}

/// Read and normalize both fact tables from `<root>/data_processed/`.
///
/// Absent files fail with [`KpiError::MissingData`], which names both
/// expected paths. Unparseable dates and batch ids become null instead of
/// failing the load.
pub fn load_tables(root: &Path) -> Result<SourceTables> {
    let data_dir = root.join(DATA_DIR);
    let batches_path = data_dir.join(BATCHES_FILE);
    let downtime_path = data_dir.join(DOWNTIME_FILE);

    if !batches_path.is_file() || !downtime_path.is_file() {
        return Err(KpiError::MissingData {
            batches: batches_path,
            downtime: downtime_path,
        });
    }

    info!("loading source tables from {}", data_dir.display());

    let batches = scan_table(&batches_path)?;
    let batches = normalize_date(batches, DATE_COL)?;
    let batches = normalize_batch_id(batches)?;
    let downtime = normalize_batch_id(scan_table(&downtime_path)?)?;

    Ok(SourceTables { batches, downtime })
}

fn scan_table(path: &Path) -> Result<DataFrame> {
    let df = LazyFrame::scan_parquet(path, ScanArgsParquet::default())?.collect()?;
    debug!("loaded {} rows from {}", df.height(), path.display());
    Ok(df)
}

/// Coerce a date column to the `Date` dtype. String columns are parsed as
/// `%Y-%m-%d`, datetimes are truncated to the day; values that cannot be
/// read become null.
fn normalize_date(df: DataFrame, name: &str) -> Result<DataFrame> {
    let dtype = df.column(name)?.dtype().clone();
    let expr = match dtype {
        DataType::Date => col(name),
        DataType::String => col(name).str().to_date(StrptimeOptions {
            format: Some("%Y-%m-%d".into()),
            strict: false,
            ..Default::default()
        }),
        _ => col(name).cast(DataType::Date),
    };
    Ok(df.lazy().with_columns([expr.alias(name)]).collect()?)
}

/// Coerce the batch id to nullable Int64; unparseable values become null.
fn normalize_batch_id(df: DataFrame) -> Result<DataFrame> {
    Ok(df
        .lazy()
        .with_columns([col(BATCH_COL).cast(DataType::Int64)])
        .collect()?)
}

/// Session cache for the source tables, keyed by the root they were loaded
/// from. The caller owns the cache and decides when it is stale; there is no
/// process-global memoization. File changes under an unchanged root are not
/// detected (acceptable staleness).
#[derive(Debug)]
pub struct DataCache {
    root: PathBuf,
    tables: Option<SourceTables>,
}

impl DataCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tables: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The loaded tables, reading from disk on first use only.
    pub fn get_or_load(&mut self) -> Result<&SourceTables> {
        if self.tables.is_none() {
            self.tables = Some(load_tables(&self.root)?);
        }
        Ok(self.tables.as_ref().expect("tables populated above"))
    }

    /// Drop the cached tables; the next access re-reads the files.
    pub fn invalidate(&mut self) {
        debug!("invalidating cached tables for {}", self.root.display());
        self.tables = None;
    }

    pub fn reload(&mut self) -> Result<&SourceTables> {
        self.invalidate();
        self.get_or_load()
    }
}
