use mrdc_core::{CatalogError, SourceError};
use mrdc_tx::{NormalizeError, ValidateError};

/// Why one table's pipeline ended in `Failed`, or why a run could not start
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("table `{table}`: {message}")]
    Config { table: String, message: String },

    #[error("table `{table}`: {source} (after {attempts} attempt(s))")]
    Source {
        table: String,
        attempts: u32,
        #[source]
        source: SourceError,
    },

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Validate(#[from] ValidateError),

    #[error(
        "table `{table}`: PrimaryKeyDropRateExceeded: {dropped} of {normalized} records dropped, limit is {max_ratio}"
    )]
    PrimaryKeyDropRateExceeded {
        table: String,
        dropped: u64,
        normalized: u64,
        max_ratio: f64,
    },

    #[error("table `{0}`: cancelled")]
    Cancelled(String),

    #[error("table `{table}`: pipeline task aborted: {reason}")]
    Aborted { table: String, reason: String },
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}
