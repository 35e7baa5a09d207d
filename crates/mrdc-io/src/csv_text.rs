//! Delimited text to raw record batches.

use std::io::Cursor;

use arrow_array::RecordBatch;
use arrow_csv::ReaderBuilder;
use arrow_csv::reader::Format;
use mrdc_core::SourceError;
use mrdc_core::batch::raw_schema;

/// Read a CSV document with a header line into raw batches
///
/// Only the header is inferred; every column is read as nullable text so no
/// value is coerced before the normalizer sees it. Short rows are padded
/// with nulls.
pub fn read_csv(bytes: &[u8], batch_rows: usize) -> Result<Vec<RecordBatch>, SourceError> {
    let format = Format::default().with_header(true);
    let (inferred, _) = format.infer_schema(Cursor::new(bytes), Some(1))?;
    if inferred.fields().is_empty() {
        return Ok(Vec::new());
    }
    let names: Vec<&str> = inferred.fields().iter().map(|f| f.name().as_str()).collect();

    let reader = ReaderBuilder::new(raw_schema(&names))
        .with_format(format)
        .with_truncated_rows(true)
        .with_batch_size(batch_rows.max(1))
        .build(Cursor::new(bytes))?;

    reader
        .map(|batch| batch.map_err(SourceError::from))
        .collect()
}
