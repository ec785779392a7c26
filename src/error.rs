use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KpiError {
    #[error(
        "source parquet files not found:\n  - {}\n  - {}",
        .batches.display(),
        .downtime.display()
    )]
    MissingData { batches: PathBuf, downtime: PathBuf },

    #[error("the Date column carries no readable dates; check fact_batches.parquet")]
    DateBounds,

    #[error("no batch rows match the current selection")]
    EmptySelection,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KpiError {
    /// An empty selection is a filter choice, not a failure; everything else
    /// ends the interaction.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, KpiError::EmptySelection)
    }
}

pub type Result<T> = std::result::Result<T, KpiError>;
