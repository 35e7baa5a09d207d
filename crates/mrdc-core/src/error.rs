//! Error taxonomy shared across the pipeline crates.
//!
//! Only [`SourceError::Unavailable`] is retried; everything else is either
//! fatal for one table's pipeline or recovered locally.

use std::fmt;

use arrow_schema::ArrowError;
use serde::{Deserialize, Serialize};

/// Failure of a source adapter
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Transient fetch failure (network, permission, timeout, IO)
    ///
    /// Retried with bounded backoff by the orchestrator.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The payload does not have the shape the adapter expects
    ///
    /// Fatal for the table's pipeline; retrying cannot fix a structural mismatch.
    #[error("source format error: {0}")]
    Format(String),

    /// The consumer stopped listening before the fetch finished
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),
}

impl SourceError {
    pub fn unavailable(err: impl fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }

    pub fn format(err: impl fmt::Display) -> Self {
        Self::Format(err.to_string())
    }

    /// Whether retrying the same fetch could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<ArrowError> for SourceError {
    fn from(err: ArrowError) -> Self {
        match err {
            ArrowError::IoError(msg, _) => Self::Unavailable(msg),
            other => Self::Format(other.to_string()),
        }
    }
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format(format!("invalid JSON payload: {err}"))
    }
}

/// Destination-side rejection of a finished table
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    #[error("load of `{table}` rejected: {reason}")]
    LoadRejected { table: String, reason: String },
}

impl SinkError {
    pub fn rejected(table: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::LoadRejected {
            table: table.into(),
            reason: reason.to_string(),
        }
    }
}

/// Why a single field could not be normalized
///
/// Always recovered locally: the field becomes null, the row is kept.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, thiserror::Error,
)]
#[serde(rename_all = "snake_case")]
pub enum FieldIssue {
    #[error("value matched no normalization rule")]
    Unparseable,
    #[error("value has more than one plausible reading")]
    Ambiguous,
}

/// Why a record was dropped by the primary-key validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryKeyInvalid {
    /// The key field is null after normalization
    Null,
    /// The key field does not match the declared key format
    Malformed,
    /// An earlier record already carried the same key
    Duplicate,
}

impl fmt::Display for PrimaryKeyInvalid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Null => "null key",
            Self::Malformed => "malformed key",
            Self::Duplicate => "duplicate key",
        };
        write!(f, "PrimaryKeyInvalid({reason})")
    }
}

/// Invalid schema catalog definitions
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("table `{0}` is defined more than once")]
    DuplicateTable(String),

    #[error("unknown table `{0}`")]
    UnknownTable(String),

    #[error("table `{table}` declares column `{column}` more than once")]
    DuplicateColumn { table: String, column: String },

    #[error("table `{table}`: primary key `{column}` is not a declared column")]
    MissingPrimaryKey { table: String, column: String },

    #[error("table `{table}`: column `{column}` derives from `{from}`, which is not an earlier column")]
    BadDerivation {
        table: String,
        column: String,
        from: String,
    },

    #[error("table `{table}`: foreign key column `{column}` is not a declared column")]
    BadForeignKey { table: String, column: String },

    #[error("table `{table}`: invalid key pattern `{pattern}`: {source}")]
    BadKeyPattern {
        table: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
