use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mrdc_core::{CanonicalTable, Operator, Sink, SinkError};

#[derive(Default)]
struct Inner {
    tables: BTreeMap<String, CanonicalTable>,
    rejected: HashSet<String>,
}

/// Keeps loaded tables in memory; clones share the same storage
#[derive(Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every future load of `table`
    pub fn reject(&self, table: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.rejected.insert(table.to_string());
        }
    }

    pub fn table(&self, name: &str) -> Option<CanonicalTable> {
        self.inner.lock().ok()?.tables.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|inner| inner.tables.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Operator for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn load(&self, table: CanonicalTable) -> Result<u64, SinkError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| SinkError::rejected(&table.name, "memory sink poisoned"))?;
        if inner.rejected.contains(&table.name) {
            return Err(SinkError::rejected(&table.name, "rejected by configuration"));
        }
        let rows = table.num_rows() as u64;
        inner.tables.insert(table.name.clone(), table);
        Ok(rows)
    }
}
