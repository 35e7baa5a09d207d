//! # MRDC Pipeline - Per-Table Orchestration
//!
//! Drives each table from its source adapter to the sink:
//! `Fetching → Normalizing → Validating → Ready`, or `Failed`.
//!
//! - Tables run as independent tokio tasks, bounded by a semaphore.
//! - Transient source failures are retried with the source's
//!   [`RetryPolicy`](mrdc_core::retry::RetryPolicy); format errors are fatal.
//! - Each table has its own cancellation token (a child of the run's).
//! - A run ends with a [`RunReport`]: per-table counts, errors, and a
//!   foreign-key audit over the tables that were loaded.

pub mod error;
pub mod integrity;
pub mod orchestrator;
pub mod report;
pub mod state;

pub use error::PipelineError;
pub use integrity::{AuditOutcome, ForeignKeyAudit};
pub use orchestrator::{Orchestrator, RunHandle, unsourced_tables};
pub use report::{RunReport, TableReport};
pub use state::PipelineState;
