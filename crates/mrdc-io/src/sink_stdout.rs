use arrow_cast::pretty::pretty_format_batches;
use async_trait::async_trait;
use mrdc_core::{CanonicalTable, Operator, Sink, SinkError};

/// Rows shown per table unless configured otherwise
pub const DEFAULT_PREVIEW_ROWS: usize = 20;

/// Pretty-prints the head of every loaded table; for development runs
pub struct StdoutSink {
    id: String,
    preview_rows: usize,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self::with_preview_rows(DEFAULT_PREVIEW_ROWS)
    }

    pub fn with_preview_rows(preview_rows: usize) -> Self {
        Self {
            id: "stdout".to_string(),
            preview_rows,
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for StdoutSink {
    fn name(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Sink for StdoutSink {
    async fn load(&self, table: CanonicalTable) -> Result<u64, SinkError> {
        let rows = table.num_rows();
        let head = table.batch.slice(0, rows.min(self.preview_rows));
        let rendered =
            pretty_format_batches(&[head]).map_err(|e| SinkError::rejected(&table.name, e))?;
        println!("{} ({} rows)\n{}", table.name, rows, rendered);
        Ok(rows as u64)
    }
}
