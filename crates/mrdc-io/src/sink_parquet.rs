use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use mrdc_core::{CanonicalTable, Operator, Sink, SinkError};
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::info;

/// Writes each canonical table to `<dir>/<table>.parquet`, replacing any
/// previous file
pub struct ParquetDirSink {
    id: String,
    dir: PathBuf,
}

impl ParquetDirSink {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            id: format!("parquet:{}", dir.display()),
            dir,
        }
    }

    fn write(dir: PathBuf, table: CanonicalTable) -> Result<u64, SinkError> {
        let reject = |e: &dyn std::fmt::Display| SinkError::rejected(&table.name, e);
        fs::create_dir_all(&dir).map_err(|e| reject(&e))?;
        let file_path = dir.join(format!("{}.parquet", table.name));
        let file = fs::File::create(&file_path).map_err(|e| reject(&e))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer =
            ArrowWriter::try_new(file, table.schema(), Some(props)).map_err(|e| reject(&e))?;
        writer.write(&table.batch).map_err(|e| reject(&e))?;
        writer.close().map_err(|e| reject(&e))?;
        info!(table = %table.name, rows = table.num_rows(), path = %file_path.display(), "parquet written");
        Ok(table.num_rows() as u64)
    }
}

impl Operator for ParquetDirSink {
    fn name(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Sink for ParquetDirSink {
    async fn load(&self, table: CanonicalTable) -> Result<u64, SinkError> {
        let dir = self.dir.clone();
        let name = table.name.clone();
        tokio::task::spawn_blocking(move || Self::write(dir, table))
            .await
            .map_err(|e| SinkError::rejected(name, e))?
    }
}
