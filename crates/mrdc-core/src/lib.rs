//! # MRDC Core - Retail Data Centralisation Core Library
//!
//! This crate provides the foundational types, traits, and abstractions shared by every
//! stage of the MRDC pipeline. It defines the messaging system between a source adapter
//! and its consumer, the operator interfaces, the schema catalog describing the six
//! canonical tables, and the YAML configuration structures.
//!
//! ## Key Components
//!
//! - **Message System**: raw record batches flow from a [`Source`] over a bounded channel
//! - **Operator Traits**: [`Source`] and [`Sink`] abstractions at the pipeline boundaries
//! - **Schema Catalog**: per-table primary key, column types and normalizer chains
//! - **Configuration**: YAML-based pipeline specification ([`spec::PipelineSpec`])
//! - **Error Handling**: the adapter and sink error taxonomy ([`error`])
//!
//! ## Example Usage
//!
//! ```rust
//! use mrdc_core::{Message, catalog::SchemaCatalog};
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let catalog = SchemaCatalog::builtin();
//! assert!(catalog.get("dim_users").is_some());
//!
//! let (tx, mut rx) = mpsc::channel::<Message>(8);
//! let _cancel = CancellationToken::new();
//! tx.send(Message::Eos).await.unwrap();
//! assert!(matches!(rx.recv().await, Some(Message::Eos)));
//! # }
//! ```

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub mod batch;
pub mod builtin;
pub mod catalog;
pub mod error;
pub mod retry;
pub mod spec;
pub mod value;

pub use error::{CatalogError, FieldIssue, PrimaryKeyInvalid, SinkError, SourceError};

/// Type alias for Apache Arrow RecordBatch, representing a batch of columnar data
pub type Batch = RecordBatch;

/// Type alias for the sender side of the channel between a source and its consumer
pub type BatchTx = mpsc::Sender<Message>;

/// Type alias for the receiver side of the channel between a source and its consumer
pub type BatchRx = mpsc::Receiver<Message>;

/// Messages passed from a source adapter to the pipeline
///
/// A source emits zero or more `Batch` messages followed by a single `Eos`.
/// Zero batches followed by `Eos` is an empty but successful fetch; a failed
/// fetch is reported through the `Err` returned by [`Source::run`] instead.
#[derive(Debug, Clone)]
pub enum Message {
    /// A raw record batch: every column is nullable `Utf8`
    ///
    /// Field values are untyped text exactly as the source produced them;
    /// typing happens in the normalizer.
    Batch(Batch),

    /// End-of-stream marker
    ///
    /// Signals that no more data will be sent through this channel,
    /// allowing the consumer to finalize the fetch.
    Eos,
}

/// Base trait for all pipeline operators
///
/// Provides the identifier used in logs and reports.
pub trait Operator: Send + Sync {
    /// Returns the unique name/identifier of this operator
    fn name(&self) -> &str;
}

/// Trait for source adapters
///
/// Sources are the entry points of a table pipeline. Each adapter owns the
/// protocol specifics of one raw source format and converts its payload into
/// raw record batches.
///
/// ## Implementations
/// - Relational export (PostgreSQL table)
/// - Document table (PDF)
/// - Object store (CSV / JSON object)
/// - REST endpoint (JSON)
/// - Linked JSON (collection of item links)
/// - Local files
#[async_trait]
pub trait Source: Operator {
    /// Run the source once
    ///
    /// Sends every raw batch through `tx` and finishes with [`Message::Eos`].
    /// `run` may be invoked again after a transient failure; each call is a
    /// fresh, complete fetch.
    ///
    /// # Arguments
    /// * `tx` - Channel sender for publishing raw batches
    /// * `cancel` - Cancellation token; in-flight calls are abandoned once it fires
    ///
    /// # Returns
    /// `SourceError::Unavailable` for network/IO failures (retryable) and
    /// `SourceError::Format` when the payload does not have the expected shape.
    async fn run(&mut self, tx: BatchTx, cancel: CancellationToken) -> Result<(), SourceError>;
}

/// Trait for output sinks
///
/// Sinks are the exit points of a table pipeline: they accept one finished
/// [`CanonicalTable`] for bulk load. Retrying a rejected load is the sink's concern.
#[async_trait]
pub trait Sink: Operator {
    /// Load a canonical table, returning the number of rows accepted
    async fn load(&self, table: CanonicalTable) -> Result<u64, SinkError>;
}

/// A typed, deduplicated, primary-key-valid table ready for loading
///
/// The batch schema is the one declared by the table's
/// [`catalog::TableDefinition`]; the primary-key column is non-nullable.
#[derive(Debug, Clone)]
pub struct CanonicalTable {
    /// Catalog name of the table (`dim_users`, `orders_table`, ...)
    pub name: String,

    /// The table contents as a single record batch
    pub batch: RecordBatch,
}

impl CanonicalTable {
    pub fn new(name: impl Into<String>, batch: RecordBatch) -> Self {
        Self {
            name: name.into(),
            batch,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }
}

/// Send a raw batch downstream, mapping a closed channel to an error
///
/// Empty batches are skipped so consumers never see zero-row messages.
pub async fn send_batch(tx: &BatchTx, batch: Batch) -> Result<(), SourceError> {
    if batch.num_rows() == 0 {
        return Ok(());
    }
    tx.send(Message::Batch(batch))
        .await
        .map_err(|_| SourceError::ChannelClosed("raw batch receiver dropped"))
}
