use std::sync::LazyLock;

use anyhow::{Result, bail};
use async_trait::async_trait;
use futures::TryStreamExt;
use mrdc_core::batch::records_from_json;
use mrdc_core::spec::RelationalSourceSpec;
use mrdc_core::{BatchTx, Message, Operator, Source, SourceError, send_batch};
use regex::Regex;
use serde_json::Value as Json;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::info;

static IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static identifier pattern"));

/// Quote a possibly schema-qualified table name for interpolation
///
/// Only plain identifiers are accepted, so quoting cannot be escaped.
pub fn quote_table(name: &str) -> Option<String> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 || !parts.iter().all(|p| IDENT.is_match(p)) {
        return None;
    }
    Some(parts.iter().map(|p| format!("\"{p}\"")).collect::<Vec<_>>().join("."))
}

/// Undefined table or column: retrying the same query cannot help
fn map_sqlx(err: sqlx::Error) -> SourceError {
    match &err {
        sqlx::Error::Database(db) if matches!(db.code().as_deref(), Some("42P01" | "42703")) => {
            SourceError::Format(err.to_string())
        }
        _ => SourceError::Unavailable(err.to_string()),
    }
}

/// A table exported wholesale from PostgreSQL
///
/// Rows are read as `row_to_json` text so every column type arrives as the
/// same textual rendering a delimited export would have.
pub struct RelationalSource {
    id: String,
    spec: RelationalSourceSpec,
    query: String,
}

impl RelationalSource {
    pub fn try_new(table: &str, spec: RelationalSourceSpec) -> Result<Self> {
        let Some(quoted) = quote_table(&spec.source_table) else {
            bail!("`{}` is not a valid table name", spec.source_table);
        };
        Ok(Self {
            id: format!("{table}:relational"),
            query: format!("SELECT row_to_json(t)::text FROM {quoted} AS t"),
            spec,
        })
    }
}

impl Operator for RelationalSource {
    fn name(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Source for RelationalSource {
    async fn run(&mut self, tx: BatchTx, cancel: CancellationToken) -> Result<(), SourceError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.spec.max_connections.max(1))
            .connect(&self.spec.url)
            .await
            .map_err(|e| SourceError::Unavailable(format!("connect: {e}")))?;
        info!(source = %self.id, table = %self.spec.source_table, "exporting table");

        let batch_rows = self.spec.batch_rows.max(1);
        let mut rows = sqlx::query_scalar::<_, String>(&self.query).fetch(&pool);
        let mut pending: Vec<Json> = Vec::with_capacity(batch_rows.min(4096));
        let mut total = 0usize;
        while let Some(text) = rows.try_next().await.map_err(map_sqlx)? {
            if cancel.is_cancelled() {
                return Ok(());
            }
            pending.push(serde_json::from_str(&text)?);
            if pending.len() >= batch_rows {
                total += pending.len();
                send_batch(&tx, records_from_json(&pending)?).await?;
                pending.clear();
            }
        }
        total += pending.len();
        if !pending.is_empty() {
            send_batch(&tx, records_from_json(&pending)?).await?;
        }
        drop(rows);
        pool.close().await;
        info!(source = %self.id, rows = total, "export finished");

        tx.send(Message::Eos)
            .await
            .map_err(|_| SourceError::ChannelClosed("eos receiver dropped"))
    }
}
