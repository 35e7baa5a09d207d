//! Load-time foreign-key audit.
//!
//! Runs only after every table pipeline has finished, over the tables that
//! reached `Ready` and were accepted by the sink. It counts orphans and
//! never changes data.

use std::collections::{HashMap, HashSet};

use arrow_array::Array;
use arrow_cast::display::array_value_to_string;
use arrow_schema::ArrowError;
use mrdc_core::CanonicalTable;
use mrdc_core::catalog::SchemaCatalog;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// `checked` counts non-null references; nulls are not orphans
    Checked { checked: u64, orphans: u64 },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyAudit {
    pub table: String,
    pub column: String,
    pub references: String,
    #[serde(flatten)]
    pub outcome: AuditOutcome,
}

impl ForeignKeyAudit {
    pub fn orphans(&self) -> u64 {
        match self.outcome {
            AuditOutcome::Checked { orphans, .. } => orphans,
            AuditOutcome::Skipped { .. } => 0,
        }
    }
}

fn column_keys(table: &CanonicalTable, column: &str) -> Result<Option<Vec<Option<String>>>, ArrowError> {
    let Some(array) = table.batch.column_by_name(column) else {
        return Ok(None);
    };
    (0..array.len())
        .map(|row| {
            if array.is_null(row) {
                Ok(None)
            } else {
                array_value_to_string(array, row).map(Some)
            }
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Check every foreign key of every loaded table against the referenced key set
pub fn audit_foreign_keys(
    catalog: &SchemaCatalog,
    loaded: &HashMap<String, CanonicalTable>,
) -> Result<Vec<ForeignKeyAudit>, ArrowError> {
    let mut key_sets: HashMap<&str, HashSet<String>> = HashMap::new();
    let mut audits = Vec::new();

    for def in catalog.tables() {
        let Some(table) = loaded.get(&def.name) else {
            continue;
        };
        for fk in &def.foreign_keys {
            let skipped = |reason: &str| ForeignKeyAudit {
                table: def.name.clone(),
                column: fk.column.clone(),
                references: fk.references.clone(),
                outcome: AuditOutcome::Skipped {
                    reason: reason.to_string(),
                },
            };

            let (Some(referenced), Some(target)) = (catalog.get(&fk.references), loaded.get(&fk.references))
            else {
                audits.push(skipped("referenced table is not ready and loaded"));
                continue;
            };

            if !key_sets.contains_key(referenced.name.as_str()) {
                let keys = column_keys(target, &referenced.primary_key)?.unwrap_or_default();
                key_sets.insert(referenced.name.as_str(), keys.into_iter().flatten().collect());
            }
            let Some(known) = key_sets.get(referenced.name.as_str()) else {
                continue;
            };
            let Some(values) = column_keys(table, &fk.column)? else {
                audits.push(skipped("column missing from the loaded table"));
                continue;
            };

            let mut checked = 0u64;
            let mut orphans = 0u64;
            for value in values.iter().flatten() {
                checked += 1;
                if !known.contains(value) {
                    orphans += 1;
                }
            }
            if orphans > 0 {
                warn!(table = %def.name, column = %fk.column, references = %fk.references, orphans, checked, "foreign key orphans");
            } else {
                info!(table = %def.name, column = %fk.column, references = %fk.references, checked, "foreign key consistent");
            }
            audits.push(ForeignKeyAudit {
                table: def.name.clone(),
                column: fk.column.clone(),
                references: fk.references.clone(),
                outcome: AuditOutcome::Checked { checked, orphans },
            });
        }
    }
    Ok(audits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{RecordBatch, StringArray};
    use arrow_schema::{DataType, Field, Schema};
    use mrdc_core::catalog::{ColumnDef, KeyFormat, TableDefinition};
    use std::sync::Arc;

    fn text_table(name: &str, column: &str, values: Vec<Option<&str>>) -> CanonicalTable {
        let schema = Arc::new(Schema::new(vec![Field::new(column, DataType::Utf8, true)]));
        let batch = RecordBatch::try_new(schema, vec![Arc::new(StringArray::from(values))]).unwrap();
        CanonicalTable::new(name, batch)
    }

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::new(vec![
            TableDefinition::new("stores", "store_code", KeyFormat::Any).column(ColumnDef::text("store_code")),
            TableDefinition::new("users", "user_uuid", KeyFormat::Any).column(ColumnDef::text("user_uuid")),
            TableDefinition::new("orders", "store_code", KeyFormat::Any)
                .column(ColumnDef::text("store_code"))
                .foreign_key("store_code", "stores")
                .foreign_key("store_code", "users"),
        ])
        .unwrap()
    }

    #[test]
    fn counts_orphans_and_skips_missing_references() {
        let mut loaded = HashMap::new();
        loaded.insert("stores".to_string(), text_table("stores", "store_code", vec![Some("A-1"), Some("B-2")]));
        loaded.insert(
            "orders".to_string(),
            text_table("orders", "store_code", vec![Some("A-1"), Some("C-3"), None, Some("B-2")]),
        );

        let audits = audit_foreign_keys(&catalog(), &loaded).unwrap();
        assert_eq!(audits.len(), 2);
        assert_eq!(audits[0].outcome, AuditOutcome::Checked { checked: 3, orphans: 1 });
        assert_eq!(audits[0].orphans(), 1);
        assert!(matches!(audits[1].outcome, AuditOutcome::Skipped { .. }));
    }

    #[test]
    fn unloaded_tables_are_not_audited() {
        let loaded = HashMap::new();
        assert!(audit_foreign_keys(&catalog(), &loaded).unwrap().is_empty());
    }
}
