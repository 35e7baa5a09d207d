//! Primary-key validation: the last gate before a table becomes canonical.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use arrow_array::builder::BooleanBuilder;
use arrow_array::{Array, RecordBatch};
use arrow_cast::display::array_value_to_string;
use arrow_schema::ArrowError;
use arrow_select::concat::concat_batches;
use arrow_select::filter::filter_record_batch;
use mrdc_core::catalog::{KeyFormat, TableDefinition};
use mrdc_core::{CanonicalTable, PrimaryKeyInvalid};
use regex::Regex;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    #[error("table `{table}`: primary key `{column}` is not a declared column")]
    MissingKey { table: String, column: String },

    #[error("table `{table}`: invalid key pattern: {source}")]
    Pattern {
        table: String,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    Arrow(#[from] ArrowError),
}

/// Number of dropped records per reason
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DropTally {
    by_reason: BTreeMap<PrimaryKeyInvalid, u64>,
}

impl DropTally {
    pub fn record(&mut self, reason: PrimaryKeyInvalid) {
        *self.by_reason.entry(reason).or_default() += 1;
    }

    pub fn get(&self, reason: PrimaryKeyInvalid) -> u64 {
        self.by_reason.get(&reason).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.by_reason.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PrimaryKeyInvalid, u64)> + '_ {
        self.by_reason.iter().map(|(r, n)| (*r, *n))
    }
}

#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub table: CanonicalTable,
    pub dropped: DropTally,
}

/// Drops records whose key is null, malformed, or already seen
///
/// The first occurrence of a key wins. Duplicate tracking is local to one
/// [`validate`](Self::validate) call, so a table is validated as one unit.
pub struct PrimaryKeyValidator {
    definition: Arc<TableDefinition>,
    key_index: usize,
    pattern: Option<Regex>,
}

impl PrimaryKeyValidator {
    pub fn new(definition: Arc<TableDefinition>) -> Result<Self, ValidateError> {
        let key_index = definition.column_index(&definition.primary_key).ok_or_else(|| {
            ValidateError::MissingKey {
                table: definition.name.clone(),
                column: definition.primary_key.clone(),
            }
        })?;
        let pattern = match &definition.key_format {
            KeyFormat::Pattern { pattern } => {
                Some(Regex::new(pattern).map_err(|source| ValidateError::Pattern {
                    table: definition.name.clone(),
                    source,
                })?)
            }
            _ => None,
        };
        Ok(Self {
            definition,
            key_index,
            pattern,
        })
    }

    fn is_well_formed(&self, key: &str) -> bool {
        match &self.definition.key_format {
            KeyFormat::Any => !key.trim().is_empty(),
            KeyFormat::Uuid => uuid::Uuid::parse_str(key).is_ok(),
            KeyFormat::Digits => !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()),
            KeyFormat::NonNegative => key.parse::<i64>().is_ok_and(|n| n >= 0),
            KeyFormat::Pattern { .. } => self.pattern.as_ref().is_some_and(|re| re.is_match(key)),
        }
    }

    /// Validate every normalized batch of one table as a single unit
    pub fn validate(&self, batches: &[RecordBatch]) -> Result<ValidationOutcome, ValidateError> {
        let def = &self.definition;
        let combined = concat_batches(&def.normalized_schema(), batches)?;
        let keys = combined.column(self.key_index);

        let mut seen: HashSet<String> = HashSet::with_capacity(combined.num_rows());
        let mut dropped = DropTally::default();
        let mut keep = BooleanBuilder::with_capacity(combined.num_rows());
        for row in 0..combined.num_rows() {
            let verdict = if keys.is_null(row) {
                Err(PrimaryKeyInvalid::Null)
            } else {
                let key = array_value_to_string(keys, row)?;
                if !self.is_well_formed(&key) {
                    Err(PrimaryKeyInvalid::Malformed)
                } else if !seen.insert(key) {
                    Err(PrimaryKeyInvalid::Duplicate)
                } else {
                    Ok(())
                }
            };
            if let Err(reason) = verdict {
                dropped.record(reason);
            }
            keep.append_value(verdict.is_ok());
        }

        let filtered = filter_record_batch(&combined, &keep.finish())?;
        let batch = RecordBatch::try_new(def.canonical_schema(), filtered.columns().to_vec())?;

        if dropped.total() > 0 {
            warn!(
                table = %def.name,
                dropped = dropped.total(),
                null = dropped.get(PrimaryKeyInvalid::Null),
                malformed = dropped.get(PrimaryKeyInvalid::Malformed),
                duplicate = dropped.get(PrimaryKeyInvalid::Duplicate),
                "dropped records with invalid primary keys"
            );
        }

        Ok(ValidationOutcome {
            table: CanonicalTable::new(def.name.clone(), batch),
            dropped,
        })
    }
}
