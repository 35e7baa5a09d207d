//! JSON payloads to raw record batches.
//!
//! Accepted shapes:
//! - an array of objects (one record each)
//! - a single object (one record)
//! - a column-oriented frame: `{"col": {"0": v, "1": v}, ...}`
//! - `null` or `[]` (no records)

use arrow_array::RecordBatch;
use arrow_schema::Schema;
use mrdc_core::SourceError;
use mrdc_core::batch::records_from_json;
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Resolve `pointer` (if any) and return the records it holds
pub fn records_at<'a>(payload: &'a Json, pointer: Option<&str>) -> Result<&'a Json, SourceError> {
    match pointer {
        // an empty response has nothing to point into
        _ if payload.is_null() => Ok(payload),
        None => Ok(payload),
        Some(p) => payload
            .pointer(p)
            .ok_or_else(|| SourceError::Format(format!("payload has no records at `{p}`"))),
    }
}

/// Flatten a payload into a list of record objects
pub fn payload_records(payload: &Json) -> Result<Vec<Json>, SourceError> {
    match payload {
        Json::Null => Ok(Vec::new()),
        Json::Array(items) => Ok(items.clone()),
        Json::Object(map) if is_column_frame(map) => Ok(transpose_frame(map)),
        Json::Object(_) => Ok(vec![payload.clone()]),
        other => Err(SourceError::Format(format!(
            "expected a JSON object or array of objects, found {}",
            kind(other)
        ))),
    }
}

pub fn batch_from_payload(payload: &Json) -> Result<RecordBatch, SourceError> {
    let records = payload_records(payload)?;
    if records.is_empty() {
        return Ok(RecordBatch::new_empty(Arc::new(Schema::empty())));
    }
    records_from_json(&records)
}

/// Parse a JSON document, falling back to newline-delimited records
pub fn parse_json_text(text: &str) -> Result<Json, SourceError> {
    match serde_json::from_str::<Json>(text) {
        Ok(v) => Ok(v),
        Err(first) => {
            let lines: Result<Vec<Json>, _> = text
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(serde_json::from_str::<Json>)
                .collect();
            match lines {
                Ok(records) if !records.is_empty() => Ok(Json::Array(records)),
                _ => Err(first.into()),
            }
        }
    }
}

fn kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

fn is_column_frame(map: &Map<String, Json>) -> bool {
    !map.is_empty()
        && map.values().all(|col| {
            col.as_object()
                .is_some_and(|cells| !cells.is_empty() && cells.keys().all(|k| k.parse::<u64>().is_ok()))
        })
}

/// Turn `{"col": {"<row>": v}}` into row objects ordered by numeric row index
fn transpose_frame(map: &Map<String, Json>) -> Vec<Json> {
    let mut rows: BTreeMap<u64, Map<String, Json>> = BTreeMap::new();
    for (column, cells) in map {
        let Some(cells) = cells.as_object() else {
            continue;
        };
        for (index, value) in cells {
            if let Ok(i) = index.parse::<u64>() {
                rows.entry(i).or_default().insert(column.clone(), value.clone());
            }
        }
    }
    rows.into_values().map(Json::Object).collect()
}
