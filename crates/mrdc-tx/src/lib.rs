//! # MRDC Tx - Normalization and Validation
//!
//! Turns the raw, all-text batches produced by source adapters into typed
//! canonical tables:
//!
//! - [`normalize::Normalizer`] runs each column's rule chain and coerces the
//!   result to the declared type. Bad fields become null and are counted.
//! - [`validate::PrimaryKeyValidator`] drops records whose key is null,
//!   malformed or duplicated, and marks the key column non-nullable.
//!
//! Rules themselves are plain data ([`mrdc_core::catalog::Rule`]); their
//! behaviour lives in [`rules`].

pub mod dates;
pub mod normalize;
pub mod numeric;
pub mod rules;
pub mod validate;
pub mod weight;

pub use normalize::{FieldIssueCounts, IssueTally, NormalizeError, NormalizedBatch, Normalizer};
pub use rules::{NormalizationRule, apply_chain};
pub use validate::{DropTally, PrimaryKeyValidator, ValidateError, ValidationOutcome};
pub use weight::WeightClass;
