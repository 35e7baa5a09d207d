//! Helpers for building raw record batches.
//!
//! A raw batch is an Arrow `RecordBatch` whose columns are all nullable
//! `Utf8`. Every adapter funnels its payload through [`RawBatchBuilder`] so
//! the normalizer only ever sees one shape.

use std::collections::HashMap;
use std::sync::Arc;

use arrow_array::builder::StringBuilder;
use arrow_array::{Array, ArrayRef, RecordBatch, RecordBatchOptions, StringArray};
use arrow_schema::{ArrowError, DataType, Field, Schema, SchemaRef};
use serde_json::{Map, Value as Json};

use crate::error::SourceError;

/// Schema of a raw batch with the given column names
pub fn raw_schema<S: AsRef<str>>(columns: &[S]) -> SchemaRef {
    let fields: Vec<Field> = columns
        .iter()
        .map(|name| Field::new(name.as_ref(), DataType::Utf8, true))
        .collect();
    Arc::new(Schema::new(fields))
}

/// Row-at-a-time builder for raw batches
pub struct RawBatchBuilder {
    columns: Vec<String>,
    builders: Vec<StringBuilder>,
    rows: usize,
}

impl RawBatchBuilder {
    pub fn new(columns: Vec<String>) -> Self {
        let builders = columns.iter().map(|_| StringBuilder::new()).collect();
        Self {
            columns,
            builders,
            rows: 0,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Append one positional row
    ///
    /// Missing trailing values become null; extra values are ignored.
    pub fn push_row<I, S>(&mut self, values: I)
    where
        I: IntoIterator<Item = Option<S>>,
        S: AsRef<str>,
    {
        let mut values = values.into_iter();
        for builder in &mut self.builders {
            match values.next().flatten() {
                Some(v) => builder.append_value(v.as_ref()),
                None => builder.append_null(),
            }
        }
        self.rows += 1;
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Finish the current batch; the builder can be reused afterwards
    pub fn finish(&mut self) -> Result<RecordBatch, ArrowError> {
        let schema = raw_schema(&self.columns);
        let arrays: Vec<ArrayRef> = self
            .builders
            .iter_mut()
            .map(|b| Arc::new(b.finish()) as ArrayRef)
            .collect();
        let options = RecordBatchOptions::new().with_row_count(Some(self.rows));
        self.rows = 0;
        RecordBatch::try_new_with_options(schema, arrays, &options)
    }
}

/// Text rendering of a JSON scalar as it would appear in a delimited export
///
/// `null` stays null; nested arrays/objects are kept as compact JSON text.
pub fn json_scalar_to_text(value: &Json) -> Option<String> {
    match value {
        Json::Null => None,
        Json::String(s) => Some(s.clone()),
        Json::Bool(b) => Some(b.to_string()),
        Json::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Build a raw batch from JSON objects
///
/// Columns are the union of keys in first-seen order; a key missing from a
/// record yields null. Any element that is not an object is a format error.
pub fn records_from_json(records: &[Json]) -> Result<RecordBatch, SourceError> {
    let mut columns: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut objects: Vec<&Map<String, Json>> = Vec::with_capacity(records.len());

    for (i, record) in records.iter().enumerate() {
        let object = record
            .as_object()
            .ok_or_else(|| SourceError::Format(format!("record {i} is not a JSON object")))?;
        for key in object.keys() {
            if !index.contains_key(key) {
                index.insert(key.clone(), columns.len());
                columns.push(key.clone());
            }
        }
        objects.push(object);
    }

    let mut builder = RawBatchBuilder::new(columns);
    for object in objects {
        let row: Vec<Option<String>> = builder
            .columns()
            .iter()
            .map(|c| object.get(c).and_then(json_scalar_to_text))
            .collect();
        builder.push_row(row);
    }
    Ok(builder.finish()?)
}

/// Borrow a raw column by name as a string array
pub fn text_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
}

/// Read one raw cell as text
pub fn text_value(array: &StringArray, row: usize) -> Option<&str> {
    if array.is_null(row) {
        None
    } else {
        Some(array.value(row))
    }
}
