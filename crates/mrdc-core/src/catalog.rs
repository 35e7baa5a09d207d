//! Schema catalog: the single source of truth for which normalizer chain
//! applies to which column of which table.
//!
//! Everything here is data. Adding a table or a column means adding a
//! [`TableDefinition`] entry (in code via [`crate::builtin`] or in the
//! pipeline YAML), never a new code path in the orchestrator.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema, SchemaRef, TimeUnit};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CatalogError;

/// Target type of a canonical column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Int64,
    Float64,
    Boolean,
    Date,
    Time,
}

impl ColumnType {
    /// Arrow type used for this column in a canonical table
    pub fn arrow_type(&self) -> DataType {
        match self {
            ColumnType::Text => DataType::Utf8,
            ColumnType::Int64 => DataType::Int64,
            ColumnType::Float64 => DataType::Float64,
            ColumnType::Boolean => DataType::Boolean,
            ColumnType::Date => DataType::Date32,
            ColumnType::Time => DataType::Time64(TimeUnit::Microsecond),
        }
    }
}

/// One normalization rule, referenced by id from a column's chain
///
/// Rules in a column's `rules` list compose: each stage receives the previous
/// stage's output. [`Rule::FirstOf`] expresses alternatives where the first
/// successful chain wins.
///
/// ```yaml
/// rules:
///   - rule: null_if
///     tokens: ["-"]
///   - rule: remap
///     map: { GGB: GB }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rule {
    /// Turn the listed tokens into null
    NullIf { tokens: Vec<String> },
    /// Remove ASCII punctuation injected into identifier-like strings
    StripPunctuation,
    Upper,
    /// Replace exact tokens; other values pass through unchanged
    Remap { map: BTreeMap<String, String> },
    /// Keep only the listed values; anything else is unparseable
    OneOf { values: Vec<String> },
    Uuid,
    Date,
    Time,
    Float,
    Int,
    /// Require a non-empty string of ASCII digits
    Digits,
    /// Parse `<number><unit>` into grams
    WeightGrams,
    /// Bucket a gram weight into a logistics weight class
    WeightClass,
    /// Map availability-style tokens to a boolean
    BoolMap {
        true_tokens: Vec<String>,
        false_tokens: Vec<String>,
    },
    /// Try each chain in order; the first success wins
    FirstOf { chains: Vec<Vec<Rule>> },
}

/// Declared format of a primary key
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum KeyFormat {
    /// Any non-empty value
    #[default]
    Any,
    /// A UUID in any accepted textual form
    Uuid,
    /// A non-empty run of ASCII digits
    Digits,
    /// A non-negative integer
    NonNegative,
    /// Must match the regular expression
    Pattern { pattern: String },
}

/// A canonical column and the chain that produces it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Canonical column name
    pub name: String,

    /// Raw column read for this column; defaults to `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(rename = "type")]
    pub column_type: ColumnType,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Rule>,

    /// Compute this column from an earlier canonical column instead of raw input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            source: None,
            column_type,
            rules: Vec::new(),
            derived_from: None,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Text)
    }

    pub fn source(mut self, raw_column: impl Into<String>) -> Self {
        self.source = Some(raw_column.into());
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn derived_from(mut self, column: impl Into<String>) -> Self {
        self.derived_from = Some(column.into());
        self
    }

    /// Name of the raw column this column reads
    pub fn source_column(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.name)
    }
}

/// A foreign key, referencing the primary key of another table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub references: String,
}

/// Immutable descriptor of one canonical table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,

    /// Name of the primary-key column
    pub primary_key: String,

    #[serde(default)]
    pub key_format: KeyFormat,

    pub columns: Vec<ColumnDef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>, key_format: KeyFormat) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
            key_format,
            columns: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn foreign_key(mut self, column: impl Into<String>, references: impl Into<String>) -> Self {
        self.foreign_keys.push(ForeignKey {
            column: column.into(),
            references: references.into(),
        });
        self
    }

    pub fn find_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Schema of the normalized (pre-validation) batches: every column nullable
    pub fn normalized_schema(&self) -> SchemaRef {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|c| Field::new(&c.name, c.column_type.arrow_type(), true))
            .collect();
        Arc::new(Schema::new(fields))
    }

    /// Schema of the canonical table: the primary key is non-nullable
    pub fn canonical_schema(&self) -> SchemaRef {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|c| Field::new(&c.name, c.column_type.arrow_type(), c.name != self.primary_key))
            .collect();
        Arc::new(Schema::new(fields))
    }

    fn check(&self) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            if let Some(from) = &column.derived_from {
                if !seen.contains(from.as_str()) {
                    return Err(CatalogError::BadDerivation {
                        table: self.name.clone(),
                        column: column.name.clone(),
                        from: from.clone(),
                    });
                }
            }
            if !seen.insert(column.name.as_str()) {
                return Err(CatalogError::DuplicateColumn {
                    table: self.name.clone(),
                    column: column.name.clone(),
                });
            }
        }
        if !seen.contains(self.primary_key.as_str()) {
            return Err(CatalogError::MissingPrimaryKey {
                table: self.name.clone(),
                column: self.primary_key.clone(),
            });
        }
        if let Some(fk) = self.foreign_keys.iter().find(|fk| !seen.contains(fk.column.as_str())) {
            return Err(CatalogError::BadForeignKey {
                table: self.name.clone(),
                column: fk.column.clone(),
            });
        }
        if let KeyFormat::Pattern { pattern } = &self.key_format {
            regex::Regex::new(pattern).map_err(|source| CatalogError::BadKeyPattern {
                table: self.name.clone(),
                pattern: pattern.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Read-only registry of table definitions, shared by every table pipeline
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    tables: Vec<Arc<TableDefinition>>,
}

impl SchemaCatalog {
    /// Build a catalog, validating every definition
    pub fn new(definitions: Vec<TableDefinition>) -> Result<Self, CatalogError> {
        let mut names = HashSet::new();
        for def in &definitions {
            if !names.insert(def.name.clone()) {
                return Err(CatalogError::DuplicateTable(def.name.clone()));
            }
            def.check()?;
        }
        Ok(Self {
            tables: definitions.into_iter().map(Arc::new).collect(),
        })
    }

    /// The six retail tables
    pub fn builtin() -> Self {
        Self {
            tables: crate::builtin::tables().into_iter().map(Arc::new).collect(),
        }
    }

    /// Replace same-named tables and append new ones
    pub fn with_overrides(self, overrides: Vec<TableDefinition>) -> Result<Self, CatalogError> {
        if overrides.is_empty() {
            return Ok(self);
        }
        let mut definitions: Vec<TableDefinition> =
            self.tables.iter().map(|t| t.as_ref().clone()).collect();
        for def in overrides {
            match definitions.iter_mut().find(|d| d.name == def.name) {
                Some(slot) => {
                    info!(table = %def.name, "catalog override replaces table");
                    *slot = def;
                }
                None => {
                    info!(table = %def.name, "catalog override adds table");
                    definitions.push(def);
                }
            }
        }
        Self::new(definitions)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TableDefinition>> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table(&self, name: &str) -> Result<&Arc<TableDefinition>, CatalogError> {
        self.get(name)
            .ok_or_else(|| CatalogError::UnknownTable(name.to_string()))
    }

    pub fn tables(&self) -> impl Iterator<Item = &Arc<TableDefinition>> {
        self.tables.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_valid() {
        let catalog = SchemaCatalog::new(crate::builtin::tables()).unwrap();
        assert_eq!(
            catalog.names(),
            vec![
                "dim_users",
                "dim_card_details",
                "dim_store_details",
                "dim_products",
                "dim_date_times",
                "orders_table"
            ]
        );
    }

    #[test]
    fn canonical_schema_marks_only_key_non_nullable() {
        let catalog = SchemaCatalog::builtin();
        let users = catalog.table("dim_users").unwrap();
        let schema = users.canonical_schema();
        for field in schema.fields() {
            assert_eq!(field.is_nullable(), field.name() != "user_uuid", "{}", field.name());
        }
        assert!(users
            .normalized_schema()
            .fields()
            .iter()
            .all(|f| f.is_nullable()));
    }

    #[test]
    fn rejects_missing_primary_key() {
        let def = TableDefinition::new("t", "id", KeyFormat::Any).column(ColumnDef::text("name"));
        let err = SchemaCatalog::new(vec![def]).unwrap_err();
        assert!(matches!(err, CatalogError::MissingPrimaryKey { .. }));
    }

    #[test]
    fn rejects_forward_derivation() {
        let def = TableDefinition::new("t", "id", KeyFormat::Any)
            .column(ColumnDef::text("id"))
            .column(ColumnDef::text("class").derived_from("weight"))
            .column(ColumnDef::new("weight", ColumnType::Float64));
        let err = SchemaCatalog::new(vec![def]).unwrap_err();
        assert!(matches!(err, CatalogError::BadDerivation { .. }));
    }

    #[test]
    fn rejects_duplicate_tables_and_bad_patterns() {
        let def = TableDefinition::new("t", "id", KeyFormat::Any).column(ColumnDef::text("id"));
        let err = SchemaCatalog::new(vec![def.clone(), def]).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateTable(name) if name == "t"));

        let bad = TableDefinition::new(
            "t",
            "id",
            KeyFormat::Pattern {
                pattern: "([".into(),
            },
        )
        .column(ColumnDef::text("id"));
        assert!(matches!(
            SchemaCatalog::new(vec![bad]).unwrap_err(),
            CatalogError::BadKeyPattern { .. }
        ));
    }

    #[test]
    fn overrides_replace_and_append() {
        let replacement = TableDefinition::new("dim_users", "email_address", KeyFormat::Any)
            .column(ColumnDef::text("email_address"));
        let extra = TableDefinition::new("dim_regions", "region", KeyFormat::Any)
            .column(ColumnDef::text("region"));
        let catalog = SchemaCatalog::builtin()
            .with_overrides(vec![replacement, extra])
            .unwrap();
        assert_eq!(catalog.len(), 7);
        assert_eq!(catalog.table("dim_users").unwrap().primary_key, "email_address");
        assert!(catalog.get("dim_regions").is_some());
    }

    #[test]
    fn table_definitions_deserialize_from_yaml() {
        let yaml = r#"
name: dim_regions
primary_key: code
key_format:
  format: pattern
  pattern: "^[A-Z]{2}$"
columns:
  - name: code
    type: text
    rules:
      - rule: upper
  - name: label
    source: region_label
    type: text
    rules:
      - rule: remap
        map: { eeEurope: Europe }
"#;
        let def: TableDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.columns[1].source_column(), "region_label");
        assert_eq!(def.columns[0].rules, vec![Rule::Upper]);
        assert!(SchemaCatalog::new(vec![def]).is_ok());
    }
}
