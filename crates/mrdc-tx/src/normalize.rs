//! Apply a table definition's normalizer chains to a raw batch.

use std::collections::BTreeMap;
use std::sync::Arc;

use arrow_array::builder::{
    BooleanBuilder, Date32Builder, Float64Builder, Int64Builder, StringBuilder,
    Time64MicrosecondBuilder,
};
use arrow_array::cast::AsArray;
use arrow_array::types::{Float64Type, Int64Type};
use arrow_array::{Array, ArrayRef, RecordBatch, StringArray};
use arrow_schema::{ArrowError, DataType, SchemaRef};
use chrono::{NaiveDate, NaiveTime, Timelike};
use mrdc_core::FieldIssue;
use mrdc_core::batch::text_value;
use mrdc_core::catalog::{ColumnType, Rule, TableDefinition};
use mrdc_core::value::Value;
use serde::Serialize;

use crate::rules::{NormalizationRule, apply_chain};

/// Textual null markers found in exports; compared after trimming
pub const DEFAULT_NULL_TOKENS: [&str; 6] = ["", "NULL", "N/A", "NaN", "None", "null"];

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("table `{table}`: raw input has no column `{column}`")]
    MissingColumn { table: String, column: String },

    #[error("table `{table}`: {source}")]
    Arrow {
        table: String,
        #[source]
        source: ArrowError,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IssueTally {
    pub unparseable: u64,
    pub ambiguous: u64,
}

impl IssueTally {
    pub fn total(&self) -> u64 {
        self.unparseable + self.ambiguous
    }
}

/// Per-column counts of fields that were nulled by normalization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldIssueCounts {
    columns: BTreeMap<String, IssueTally>,
}

impl FieldIssueCounts {
    pub fn record(&mut self, column: &str, issue: FieldIssue) {
        let tally = self.columns.entry(column.to_string()).or_default();
        match issue {
            FieldIssue::Unparseable => tally.unparseable += 1,
            FieldIssue::Ambiguous => tally.ambiguous += 1,
        }
    }

    pub fn merge(&mut self, other: &FieldIssueCounts) {
        for (column, tally) in &other.columns {
            let mine = self.columns.entry(column.clone()).or_default();
            mine.unparseable += tally.unparseable;
            mine.ambiguous += tally.ambiguous;
        }
    }

    pub fn get(&self, column: &str) -> IssueTally {
        self.columns.get(column).copied().unwrap_or_default()
    }

    pub fn total(&self) -> u64 {
        self.columns.values().map(IssueTally::total).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &IssueTally)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A typed batch plus the field defects recovered while producing it
#[derive(Debug, Clone)]
pub struct NormalizedBatch {
    pub batch: RecordBatch,
    pub issues: FieldIssueCounts,
}

/// Turns raw batches of one table into typed batches
///
/// Field defects never remove a row: the field becomes null and the defect
/// is counted. Only a raw batch missing a declared source column is an error.
pub struct Normalizer {
    definition: Arc<TableDefinition>,
    schema: SchemaRef,
}

impl Normalizer {
    pub fn new(definition: Arc<TableDefinition>) -> Self {
        let schema = definition.normalized_schema();
        Self { definition, schema }
    }

    pub fn definition(&self) -> &TableDefinition {
        &self.definition
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn normalize(&self, raw: &RecordBatch) -> Result<NormalizedBatch, NormalizeError> {
        let mut issues = FieldIssueCounts::default();
        if raw.num_rows() == 0 {
            return Ok(NormalizedBatch {
                batch: RecordBatch::new_empty(self.schema.clone()),
                issues,
            });
        }

        let def = &self.definition;
        let mut computed: Vec<Vec<Value>> = Vec::with_capacity(def.columns.len());
        for column in &def.columns {
            let inputs = match &column.derived_from {
                Some(from) => def
                    .column_index(from)
                    .and_then(|i| computed.get(i))
                    .cloned()
                    .ok_or_else(|| self.missing(from))?,
                None => self.raw_values(raw, column.source_column())?,
            };

            let values = inputs
                .into_iter()
                .map(|value| {
                    apply_chain(&column.rules, value)
                        .and_then(|v| coerce_to(column.column_type, v))
                        .unwrap_or_else(|issue| {
                            issues.record(&column.name, issue);
                            Value::Null
                        })
                })
                .collect();
            computed.push(values);
        }

        let arrays: Vec<ArrayRef> = def
            .columns
            .iter()
            .zip(&computed)
            .map(|(column, values)| build_array(column.column_type, values))
            .collect();
        let batch = RecordBatch::try_new(self.schema.clone(), arrays).map_err(|source| {
            NormalizeError::Arrow {
                table: def.name.clone(),
                source,
            }
        })?;
        Ok(NormalizedBatch { batch, issues })
    }

    fn missing(&self, column: &str) -> NormalizeError {
        NormalizeError::MissingColumn {
            table: self.definition.name.clone(),
            column: column.to_string(),
        }
    }

    fn cast(&self, column: &ArrayRef, to: &DataType) -> Result<ArrayRef, NormalizeError> {
        arrow_cast::cast(column, to).map_err(|source| NormalizeError::Arrow {
            table: self.definition.name.clone(),
            source,
        })
    }

    /// Raw cells of one column
    ///
    /// Text is trimmed and default null tokens become null. Integer, float
    /// and boolean columns keep their type so already-typed input (a
    /// re-ingested canonical table) passes through numeric rules unchanged.
    fn raw_values(&self, raw: &RecordBatch, name: &str) -> Result<Vec<Value>, NormalizeError> {
        let column = raw.column_by_name(name).ok_or_else(|| self.missing(name))?;
        let data_type = column.data_type();

        if data_type.is_integer() {
            let ints = self.cast(column, &DataType::Int64)?;
            let ints = ints.as_primitive::<Int64Type>();
            return Ok(ints.iter().map(|v| v.map_or(Value::Null, Value::Int)).collect());
        }
        if data_type.is_floating() {
            let floats = self.cast(column, &DataType::Float64)?;
            let floats = floats.as_primitive::<Float64Type>();
            return Ok(floats
                .iter()
                .map(|v| match v {
                    Some(f) if f.is_finite() => Value::Float(f),
                    _ => Value::Null,
                })
                .collect());
        }
        if data_type == &DataType::Boolean {
            return Ok(column
                .as_boolean()
                .iter()
                .map(|v| v.map_or(Value::Null, Value::Bool))
                .collect());
        }

        let column = if data_type == &DataType::Utf8 {
            column.clone()
        } else {
            self.cast(column, &DataType::Utf8)?
        };
        let Some(strings) = column.as_any().downcast_ref::<StringArray>() else {
            return Err(self.missing(name));
        };

        Ok((0..strings.len())
            .map(|row| match text_value(strings, row).map(str::trim) {
                Some(s) if !DEFAULT_NULL_TOKENS.contains(&s) => Value::text(s),
                _ => Value::Null,
            })
            .collect())
    }
}

/// Final coercion of a chain's output into the column's declared type
fn coerce_to(column_type: ColumnType, value: Value) -> Result<Value, FieldIssue> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match column_type {
        ColumnType::Text => Ok(match value {
            Value::Text(s) => Value::Text(s),
            Value::Int(i) => Value::Text(i.to_string()),
            Value::Float(f) => Value::Text(f.to_string()),
            Value::Bool(b) => Value::Text(b.to_string()),
            Value::Date(d) => Value::Text(d.to_string()),
            Value::Time(t) => Value::Text(t.to_string()),
            Value::Null => Value::Null,
        }),
        ColumnType::Int64 => Rule::Int.apply(value),
        ColumnType::Float64 => Rule::Float.apply(value),
        ColumnType::Date => Rule::Date.apply(value),
        ColumnType::Time => Rule::Time.apply(value),
        ColumnType::Boolean => match value {
            Value::Bool(b) => Ok(Value::Bool(b)),
            Value::Text(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::Text(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            _ => Err(FieldIssue::Unparseable),
        },
    }
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    date.signed_duration_since(NaiveDate::default()).num_days() as i32
}

fn micros_since_midnight(time: NaiveTime) -> i64 {
    time.num_seconds_from_midnight() as i64 * 1_000_000 + time.nanosecond() as i64 / 1_000
}

fn build_array(column_type: ColumnType, values: &[Value]) -> ArrayRef {
    match column_type {
        ColumnType::Text => {
            let mut b = StringBuilder::new();
            for v in values {
                match v {
                    Value::Text(s) => b.append_value(s),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        ColumnType::Int64 => {
            let mut b = Int64Builder::with_capacity(values.len());
            for v in values {
                match v {
                    Value::Int(i) => b.append_value(*i),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        ColumnType::Float64 => {
            let mut b = Float64Builder::with_capacity(values.len());
            for v in values {
                match v {
                    Value::Float(f) => b.append_value(*f),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        ColumnType::Boolean => {
            let mut b = BooleanBuilder::with_capacity(values.len());
            for v in values {
                match v {
                    Value::Bool(x) => b.append_value(*x),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        ColumnType::Date => {
            let mut b = Date32Builder::with_capacity(values.len());
            for v in values {
                match v {
                    Value::Date(d) => b.append_value(days_since_epoch(*d)),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        ColumnType::Time => {
            let mut b = Time64MicrosecondBuilder::with_capacity(values.len());
            for v in values {
                match v {
                    Value::Time(t) => b.append_value(micros_since_midnight(*t)),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::types::{Date32Type, Time64MicrosecondType};
    use arrow_array::{Float64Array, Int64Array};
    use arrow_schema::{Field, Schema};
    use mrdc_core::batch::RawBatchBuilder;
    use mrdc_core::builtin;
    use mrdc_core::catalog::{ColumnDef, KeyFormat};

    fn raw(columns: &[&str], rows: &[&[Option<&str>]]) -> RecordBatch {
        let mut builder = RawBatchBuilder::new(columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            builder.push_row(row.iter().copied());
        }
        builder.finish().unwrap()
    }

    fn products_raw(rows: &[&[Option<&str>]]) -> RecordBatch {
        raw(
            &[
                "product_name",
                "product_price",
                "weight",
                "category",
                "EAN",
                "date_added",
                "uuid",
                "removed",
                "product_code",
            ],
            rows,
        )
    }

    #[test]
    fn product_weight_and_class_are_derived() {
        let normalizer = Normalizer::new(Arc::new(builtin::dim_products()));
        let batch = products_raw(&[&[
            Some("FurReal Dazzlin' Dimples My Playful Dolphin"),
            Some("£39.99"),
            Some("1.2kg"),
            Some("toys-and-games"),
            Some("7425710935115"),
            Some("2005-12-02"),
            Some("83dc0a69-f96f-4c34-bcb7-928acae19a94"),
            Some("Still_available"),
            Some("R7-3126933h"),
        ]]);
        let out = normalizer.normalize(&batch).unwrap();
        let b = &out.batch;

        let weight = b.column_by_name("weight").unwrap().as_primitive::<Float64Type>();
        assert_eq!(weight.value(0), 1200.0);
        let class = b.column_by_name("weight_class").unwrap().as_string::<i32>();
        assert_eq!(class.value(0), "Light");
        let price = b.column_by_name("product_price").unwrap().as_primitive::<Float64Type>();
        assert_eq!(price.value(0), 39.99);
        let available = b.column_by_name("still_available").unwrap().as_boolean();
        assert!(available.value(0));
        let added = b.column_by_name("date_added").unwrap().as_primitive::<Date32Type>();
        assert_eq!(
            added.value(0),
            days_since_epoch(NaiveDate::from_ymd_opt(2005, 12, 2).unwrap())
        );
        assert!(out.issues.is_empty());
    }

    #[test]
    fn malformed_non_key_fields_become_null_and_rows_stay() {
        let normalizer = Normalizer::new(Arc::new(builtin::dim_products()));
        let batch = products_raw(&[
            &[
                Some("Widget"),
                Some("abc"),
                Some("heavy"),
                None,
                None,
                Some("someday"),
                None,
                Some("Unknown"),
                Some("AB-1"),
            ],
            &[
                Some("Gadget"),
                Some("£1.00"),
                Some("NULL"),
                None,
                None,
                Some("2019-01-01"),
                None,
                Some("Removed"),
                Some("AB-2"),
            ],
        ]);
        let out = normalizer.normalize(&batch).unwrap();
        let b = &out.batch;
        assert_eq!(b.num_rows(), 2);

        assert!(b.column_by_name("product_price").unwrap().is_null(0));
        assert!(b.column_by_name("weight").unwrap().is_null(0));
        assert!(b.column_by_name("still_available").unwrap().is_null(0));
        let class = b.column_by_name("weight_class").unwrap().as_string::<i32>();
        assert_eq!(class.value(0), "Invalid");
        assert_eq!(class.value(1), "Invalid");

        assert_eq!(out.issues.get("product_price").unparseable, 1);
        assert_eq!(out.issues.get("weight").unparseable, 1);
        assert_eq!(out.issues.get("date_added").unparseable, 1);
        assert_eq!(out.issues.get("still_available").unparseable, 1);
        // "NULL" is a null token, not a defect
        assert_eq!(out.issues.get("weight").total(), 1);
    }

    #[test]
    fn ambiguous_dates_are_counted_separately() {
        let def = TableDefinition::new("events", "id", KeyFormat::Any)
            .column(ColumnDef::text("id"))
            .column(ColumnDef::new("on", ColumnType::Date).rule(Rule::Date));
        let normalizer = Normalizer::new(Arc::new(def));
        let batch = raw(&["id", "on"], &[&[Some("1"), Some("03/04/2010")]]);
        let out = normalizer.normalize(&batch).unwrap();
        assert!(out.batch.column(1).is_null(0));
        assert_eq!(out.issues.get("on").ambiguous, 1);
    }

    #[test]
    fn typed_columns_without_rules_use_the_type_default() {
        let def = TableDefinition::new("t", "id", KeyFormat::Any)
            .column(ColumnDef::new("id", ColumnType::Int64))
            .column(ColumnDef::new("at", ColumnType::Time))
            .column(ColumnDef::new("ok", ColumnType::Boolean));
        let normalizer = Normalizer::new(Arc::new(def));
        let batch = raw(
            &["id", "at", "ok"],
            &[&[Some(" 7 "), Some("22:00:06"), Some("TRUE")]],
        );
        let b = normalizer.normalize(&batch).unwrap().batch;
        assert_eq!(b.column(0).as_primitive::<Int64Type>().value(0), 7);
        assert_eq!(
            b.column(1).as_primitive::<Time64MicrosecondType>().value(0),
            (22 * 3600 + 6) * 1_000_000
        );
        assert!(b.column(2).as_boolean().value(0));
    }

    #[test]
    fn missing_source_column_is_an_error() {
        let normalizer = Normalizer::new(Arc::new(builtin::dim_card_details()));
        let batch = raw(&["card_number"], &[&[Some("4971858637664481")]]);
        let err = normalizer.normalize(&batch).unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::MissingColumn { ref column, .. } if column == "expiry_date"
        ));
    }

    #[test]
    fn empty_raw_batch_yields_empty_typed_batch() {
        let normalizer = Normalizer::new(Arc::new(builtin::dim_users()));
        let empty = RecordBatch::new_empty(Arc::new(Schema::empty()));
        let out = normalizer.normalize(&empty).unwrap();
        assert_eq!(out.batch.num_rows(), 0);
        assert_eq!(out.batch.schema(), normalizer.schema());
    }

    #[test]
    fn non_text_raw_columns_are_cast() {
        let def = TableDefinition::new("t", "id", KeyFormat::Any)
            .column(ColumnDef::text("id"))
            .column(ColumnDef::new("qty", ColumnType::Int64));
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, true),
            Field::new("qty", DataType::Int64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["a"])),
                Arc::new(Int64Array::from(vec![5])),
            ],
        )
        .unwrap();
        let out = Normalizer::new(Arc::new(def)).normalize(&batch).unwrap();
        assert_eq!(out.batch.column(1).as_primitive::<Int64Type>().value(0), 5);
    }

    #[test]
    fn gram_weights_pass_through_unchanged() {
        let def = TableDefinition::new("t", "code", KeyFormat::Any)
            .column(ColumnDef::text("code"))
            .column(ColumnDef::new("weight", ColumnType::Float64).rule(Rule::WeightGrams))
            .column(
                ColumnDef::text("weight_class")
                    .derived_from("weight")
                    .rule(Rule::WeightClass),
            );
        let normalizer = Normalizer::new(Arc::new(def));

        let first = normalizer
            .normalize(&raw(&["code", "weight"], &[&[Some("a"), Some("1.2kg")]]))
            .unwrap();
        let grams = first.batch.column(1).as_primitive::<Float64Type>().value(0);
        assert_eq!(grams, 1200.0);

        let schema = Arc::new(Schema::new(vec![
            Field::new("code", DataType::Utf8, true),
            Field::new("weight", DataType::Float64, true),
        ]));
        let typed = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["a", "b"])),
                Arc::new(Float64Array::from(vec![Some(grams), None])),
            ],
        )
        .unwrap();
        let second = normalizer.normalize(&typed).unwrap();
        let weight = second.batch.column(1).as_primitive::<Float64Type>();
        assert_eq!(weight.value(0), 1200.0);
        assert!(weight.is_null(1));
        assert_eq!(second.batch.column(2).as_string::<i32>().value(0), "Light");
        assert!(second.issues.is_empty());
    }

    #[test]
    fn issue_counts_merge() {
        let mut a = FieldIssueCounts::default();
        a.record("weight", FieldIssue::Unparseable);
        let mut b = FieldIssueCounts::default();
        b.record("weight", FieldIssue::Unparseable);
        b.record("opening_date", FieldIssue::Ambiguous);
        a.merge(&b);
        assert_eq!(a.get("weight").unparseable, 2);
        assert_eq!(a.get("opening_date").ambiguous, 1);
        assert_eq!(a.total(), 3);
    }
}
