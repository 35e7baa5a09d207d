//! Tables printed across the pages of a PDF.
//!
//! The text layer is extracted, then read line by line: everything before
//! the first header line is ignored, header lines repeated on later pages are
//! skipped, and each remaining line is one record.

use anyhow::{Result, bail};
use arrow_array::RecordBatch;
use async_trait::async_trait;
use mrdc_core::batch::RawBatchBuilder;
use mrdc_core::spec::DocumentSourceSpec;
use mrdc_core::{BatchTx, Message, Operator, Source, SourceError, send_batch};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::http;

/// Parse extracted document text into a raw batch
///
/// Tokens are whitespace separated. Surplus tokens on a line are folded into
/// `free_text` (or the last column when there is none); short lines are
/// padded with nulls.
pub fn parse_document_table(
    text: &str,
    columns: &[String],
    free_text: Option<&str>,
) -> Result<RecordBatch, SourceError> {
    let header: Vec<&str> = columns.iter().map(String::as_str).collect();
    let free = free_text
        .and_then(|f| columns.iter().position(|c| c == f))
        .unwrap_or(columns.len().saturating_sub(1));

    let mut builder = RawBatchBuilder::new(columns.to_vec());
    let mut in_table = false;
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens == header {
            in_table = true;
            continue;
        }
        if in_table {
            builder.push_row(fold_tokens(&tokens, columns.len(), free));
        }
    }
    if !in_table {
        return Err(SourceError::Format(format!(
            "document has no header line `{}`",
            header.join(" ")
        )));
    }
    Ok(builder.finish()?)
}

fn fold_tokens(tokens: &[&str], width: usize, free: usize) -> Vec<Option<String>> {
    if tokens.len() <= width {
        return tokens.iter().map(|t| Some(t.to_string())).collect();
    }
    let tail = width - free - 1;
    let free_end = tokens.len() - tail;
    let mut row: Vec<Option<String>> = tokens[..free].iter().map(|t| Some(t.to_string())).collect();
    row.push(Some(tokens[free..free_end].join(" ")));
    row.extend(tokens[free_end..].iter().map(|t| Some(t.to_string())));
    row
}

/// A table printed in a (possibly remote) PDF document
pub struct DocumentSource {
    id: String,
    spec: DocumentSourceSpec,
    client: Client,
}

impl DocumentSource {
    pub fn try_new(table: &str, spec: DocumentSourceSpec) -> Result<Self> {
        if spec.columns.is_empty() {
            bail!("document source for `{table}` declares no columns");
        }
        if let Some(free) = &spec.free_text_column {
            if !spec.columns.contains(free) {
                bail!("free_text_column `{free}` is not one of the document columns");
            }
        }
        Ok(Self {
            id: format!("{table}:document"),
            spec,
            client: http::client()?,
        })
    }

    async fn fetch(&self) -> Result<Vec<u8>, SourceError> {
        let location = &self.spec.location;
        if http::is_remote(location) {
            http::get_bytes(&self.client, location, None, &[]).await
        } else {
            tokio::fs::read(location)
                .await
                .map_err(|e| SourceError::Unavailable(format!("open {location}: {e}")))
        }
    }
}

impl Operator for DocumentSource {
    fn name(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Source for DocumentSource {
    async fn run(&mut self, tx: BatchTx, cancel: CancellationToken) -> Result<(), SourceError> {
        info!(source = %self.id, location = %self.spec.location, "fetching document");
        let bytes = self.fetch().await?;
        if cancel.is_cancelled() {
            return Ok(());
        }

        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| SourceError::Format(format!("text extraction aborted: {e}")))?
            .map_err(|e| SourceError::Format(format!("unreadable document: {e}")))?;
        debug!(source = %self.id, chars = text.len(), "text extracted");

        let batch = parse_document_table(&text, &self.spec.columns, self.spec.free_text_column.as_deref())?;
        info!(source = %self.id, rows = batch.num_rows(), "document parsed");
        send_batch(&tx, batch).await?;
        tx.send(Message::Eos)
            .await
            .map_err(|_| SourceError::ChannelClosed("eos receiver dropped"))
    }
}
