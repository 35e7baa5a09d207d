use std::fmt;

use mrdc_tx::{DropTally, FieldIssueCounts};
use serde::Serialize;

use crate::integrity::{AuditOutcome, ForeignKeyAudit};
use crate::state::PipelineState;

/// Outcome of one table's pipeline
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub table: String,
    pub state: PipelineState,
    /// Raw records received from the source on the successful attempt
    pub fetched: u64,
    pub normalized: u64,
    pub dropped_for_key: DropTally,
    pub field_issues: FieldIssueCounts,
    pub loaded: u64,
    /// Fetch attempts made, including the successful one
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_error: Option<String>,
    pub elapsed_ms: u64,
}

impl TableReport {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            state: PipelineState::Pending,
            fetched: 0,
            normalized: 0,
            dropped_for_key: DropTally::default(),
            field_issues: FieldIssueCounts::default(),
            loaded: 0,
            attempts: 0,
            error: None,
            load_error: None,
            elapsed_ms: 0,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == PipelineState::Ready
    }

    /// Ready and accepted by the sink
    pub fn is_loaded(&self) -> bool {
        self.is_ready() && self.load_error.is_none()
    }
}

/// Everything a run produced, table by table
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub tables: Vec<TableReport>,
    pub foreign_keys: Vec<ForeignKeyAudit>,
}

impl RunReport {
    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn ready(&self) -> usize {
        self.tables.iter().filter(|t| t.is_ready()).count()
    }

    pub fn failed(&self) -> usize {
        self.tables.iter().filter(|t| t.state == PipelineState::Failed).count()
    }

    /// Every table Ready and loaded
    ///
    /// Partial success is still a valid outcome of a run; this only tells
    /// whether it was a complete one.
    pub fn is_complete_success(&self) -> bool {
        self.tables.iter().all(TableReport::is_loaded)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<20} {:<12} {:>9} {:>11} {:>8} {:>9} {:>9}",
            "TABLE", "STATE", "FETCHED", "NORMALIZED", "DROPPED", "LOADED", "ATTEMPTS"
        )?;
        for t in &self.tables {
            writeln!(
                f,
                "{:<20} {:<12} {:>9} {:>11} {:>8} {:>9} {:>9}",
                t.table,
                t.state.as_str(),
                t.fetched,
                t.normalized,
                t.dropped_for_key.total(),
                t.loaded,
                t.attempts
            )?;
            for (reason, n) in t.dropped_for_key.iter() {
                writeln!(f, "    dropped {n}: {reason}")?;
            }
            for (column, tally) in t.field_issues.iter() {
                writeln!(
                    f,
                    "    {column}: {} unparseable, {} ambiguous",
                    tally.unparseable, tally.ambiguous
                )?;
            }
            if let Some(err) = &t.error {
                writeln!(f, "    error: {err}")?;
            }
            if let Some(err) = &t.load_error {
                writeln!(f, "    load error: {err}")?;
            }
        }
        if !self.foreign_keys.is_empty() {
            writeln!(f, "foreign keys:")?;
            for fk in &self.foreign_keys {
                match &fk.outcome {
                    AuditOutcome::Checked { checked, orphans } => writeln!(
                        f,
                        "    {}.{} -> {}: {orphans} orphan(s) of {checked}",
                        fk.table, fk.column, fk.references
                    )?,
                    AuditOutcome::Skipped { reason } => writeln!(
                        f,
                        "    {}.{} -> {}: skipped ({reason})",
                        fk.table, fk.column, fk.references
                    )?,
                }
            }
        }
        write!(f, "{} ready, {} failed", self.ready(), self.failed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrdc_core::PrimaryKeyInvalid;

    #[test]
    fn complete_success_needs_every_table_loaded() {
        let mut users = TableReport::new("dim_users");
        users.state = PipelineState::Ready;
        let mut orders = TableReport::new("orders_table");
        orders.state = PipelineState::Ready;
        let mut report = RunReport {
            tables: vec![users, orders],
            foreign_keys: vec![],
        };
        assert!(report.is_complete_success());

        report.tables[1].load_error = Some("rejected".into());
        assert!(!report.is_complete_success());
        assert_eq!(report.ready(), 2);
    }

    #[test]
    fn display_lists_drop_reasons_and_errors() {
        let mut users = TableReport::new("dim_users");
        users.state = PipelineState::Ready;
        users.dropped_for_key.record(PrimaryKeyInvalid::Null);
        let mut cards = TableReport::new("dim_card_details");
        cards.state = PipelineState::Failed;
        cards.error = Some("source format error: no header".into());
        let report = RunReport {
            tables: vec![users, cards],
            foreign_keys: vec![],
        };
        let text = report.to_string();
        assert!(text.contains("PrimaryKeyInvalid(null key)"));
        assert!(text.contains("error: source format error"));
        assert!(text.ends_with("1 ready, 1 failed"));
    }

    #[test]
    fn serializes_as_json() {
        let report = RunReport {
            tables: vec![TableReport::new("dim_users")],
            foreign_keys: vec![],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["tables"][0]["state"], "pending");
        assert!(json["tables"][0].get("error").is_none());
    }
}
