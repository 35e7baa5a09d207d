//! # MRDC I/O - Source Adapters and Sinks
//!
//! Concrete implementations of the [`Source`] and [`Sink`] traits. Every
//! adapter owns the protocol specifics of one raw source format and emits
//! raw batches (all columns nullable text); typing happens downstream.
//!
//! ## Sources
//! - **Relational**: PostgreSQL table export through `sqlx`
//! - **Document**: table rows printed in a PDF, local or over HTTP
//! - **Object store**: CSV or JSON object in S3 (or an S3-compatible endpoint)
//! - **REST**: JSON endpoint, optionally paginated
//! - **Linked JSON**: item collections behind a count endpoint or link list
//! - **File**: local CSV / JSON files matched by a glob
//!
//! ## Sinks
//! - **Parquet**: one file per canonical table
//! - **Stdout**: pretty-printed preview for development
//! - **Memory**: in-process storage, used by tests
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use mrdc_core::Operator;
//! use mrdc_core::spec::{FileSourceSpec, SourceKind, SourceSpec};
//!
//! # fn main() -> anyhow::Result<()> {
//! let spec = SourceSpec {
//!     table: "orders_table".into(),
//!     retry: Default::default(),
//!     kind: SourceKind::File(FileSourceSpec {
//!         path: "data/orders/*.csv".into(),
//!         format: None,
//!         batch_rows: 8192,
//!     }),
//! };
//! let source = mrdc_io::build_source(&spec)?;
//! assert_eq!(source.name(), "orders_table:file");
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use arrow_array::RecordBatch;
use mrdc_core::spec::{SinkSpec, SourceKind, SourceSpec};
use mrdc_core::{Sink, Source};

pub mod csv_text;
pub mod http;
pub mod json_records;

/// Parquet file sink implementation
pub mod sink_parquet;

/// In-memory sink for tests and embedding
pub mod sink_memory;

/// Standard output sink for debugging
pub mod sink_stdout;

/// PDF document table source
pub mod source_document;

/// Local file source
pub mod source_file;

/// Linked JSON collection source
pub mod source_linked_json;

/// Pre-built batches, for tests
pub mod source_memory;

/// S3 object source
pub mod source_object_store;

/// PostgreSQL table source
pub mod source_relational;

/// REST endpoint source
pub mod source_rest;

pub use sink_memory::MemorySink;
pub use sink_parquet::ParquetDirSink;
pub use sink_stdout::StdoutSink;
pub use source_document::DocumentSource;
pub use source_file::FileSource;
pub use source_linked_json::LinkedJsonSource;
pub use source_memory::MemorySource;
pub use source_object_store::ObjectStoreSource;
pub use source_relational::RelationalSource;
pub use source_rest::RestSource;

/// Split a batch into slices of at most `rows` rows
pub fn chunk(batch: RecordBatch, rows: usize) -> Vec<RecordBatch> {
    let rows = rows.max(1);
    if batch.num_rows() <= rows {
        return vec![batch];
    }
    (0..batch.num_rows())
        .step_by(rows)
        .map(|offset| batch.slice(offset, rows.min(batch.num_rows() - offset)))
        .collect()
}

/// Construct the adapter a source entry describes
pub fn build_source(spec: &SourceSpec) -> Result<Box<dyn Source>> {
    let table = spec.table.as_str();
    Ok(match &spec.kind {
        SourceKind::Relational(s) => Box::new(RelationalSource::try_new(table, s.clone())?),
        SourceKind::Document(s) => Box::new(DocumentSource::try_new(table, s.clone())?),
        SourceKind::ObjectStore(s) => Box::new(ObjectStoreSource::try_new(table, s.clone())?),
        SourceKind::Rest(s) => Box::new(RestSource::try_new(table, s.clone())?),
        SourceKind::LinkedJson(s) => Box::new(LinkedJsonSource::try_new(table, s.clone())?),
        SourceKind::File(s) => Box::new(FileSource::try_new(table, s.clone())?),
    })
}

pub fn build_sink(spec: &SinkSpec) -> Arc<dyn Sink> {
    match spec {
        SinkSpec::Stdout => Arc::new(StdoutSink::new()),
        SinkSpec::ParquetDir { path } => Arc::new(ParquetDirSink::new(PathBuf::from(path))),
        SinkSpec::Memory => Arc::new(MemorySink::new()),
    }
}
