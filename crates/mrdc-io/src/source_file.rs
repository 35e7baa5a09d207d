use anyhow::{Context, Result};
use async_trait::async_trait;
use glob::glob;
use mrdc_core::spec::{FileFormat, FileSourceSpec};
use mrdc_core::{BatchTx, Message, Operator, Source, SourceError, send_batch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{chunk, csv_text, json_records};

/// Local files, one or many, matched by a glob pattern
pub struct FileSource {
    id: String,
    spec: FileSourceSpec,
}

impl FileSource {
    pub fn try_new(table: &str, spec: FileSourceSpec) -> Result<Self> {
        glob::Pattern::new(&spec.path).with_context(|| format!("invalid glob `{}`", spec.path))?;
        Ok(Self {
            id: format!("{table}:file"),
            spec,
        })
    }

    fn paths(&self) -> Result<Vec<String>, SourceError> {
        let mut paths = Vec::new();
        for entry in glob(&self.spec.path).map_err(SourceError::format)? {
            let path = entry.map_err(|e| SourceError::unavailable(e.error()))?;
            paths.push(path.display().to_string());
        }
        paths.sort();
        if paths.is_empty() {
            return Err(SourceError::Unavailable(format!(
                "no files matched: {}",
                self.spec.path
            )));
        }
        Ok(paths)
    }
}

impl Operator for FileSource {
    fn name(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Source for FileSource {
    async fn run(&mut self, tx: BatchTx, cancel: CancellationToken) -> Result<(), SourceError> {
        let paths = self.paths()?;
        info!(source = %self.id, files = paths.len(), "reading local files");

        for p in &paths {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let bytes = tokio::fs::read(p)
                .await
                .map_err(|e| SourceError::Unavailable(format!("open {p}: {e}")))?;

            let format = self
                .spec
                .format
                .or_else(|| FileFormat::from_extension(p))
                .ok_or_else(|| SourceError::Format(format!("cannot tell the format of {p}")))?;

            let batches = match format {
                FileFormat::Csv => csv_text::read_csv(&bytes, self.spec.batch_rows)?,
                FileFormat::Json => {
                    let text = String::from_utf8_lossy(&bytes);
                    let payload = json_records::parse_json_text(&text)?;
                    chunk(json_records::batch_from_payload(&payload)?, self.spec.batch_rows)
                }
            };
            for batch in batches {
                debug!(file = %p, rows = batch.num_rows(), "read batch");
                send_batch(&tx, batch).await?;
            }
        }

        tx.send(Message::Eos)
            .await
            .map_err(|_| SourceError::ChannelClosed("eos receiver dropped"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrdc_core::BatchRx;
    use tokio::sync::mpsc;

    async fn drain(mut rx: BatchRx) -> usize {
        let mut rows = 0;
        while let Some(msg) = rx.recv().await {
            match msg {
                Message::Batch(b) => rows += b.num_rows(),
                Message::Eos => break,
            }
        }
        rows
    }

    fn spec(path: String) -> FileSourceSpec {
        FileSourceSpec {
            path,
            format: None,
            batch_rows: 2,
        }
    }

    #[tokio::test]
    async fn reads_csv_and_json_files_matched_by_glob() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.csv"), "index,product_quantity\n0,3\n1,4\n2,5\n").unwrap();
        std::fs::write(dir.path().join("b.json"), r#"[{"index": "3", "product_quantity": "1"}]"#).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let pattern = format!("{}/*.[cj]s*", dir.path().display());
        let mut source = FileSource::try_new("orders_table", spec(pattern)).unwrap();
        let (tx, rx) = mpsc::channel(8);
        let (res, rows) = tokio::join!(source.run(tx, CancellationToken::new()), drain(rx));
        res.unwrap();
        assert_eq!(rows, 4);
    }

    #[tokio::test]
    async fn no_match_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = format!("{}/*.csv", dir.path().display());
        let mut source = FileSource::try_new("orders_table", spec(pattern)).unwrap();
        let (tx, _rx) = mpsc::channel(8);
        let err = source.run(tx, CancellationToken::new()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn unknown_extension_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cards.pdf");
        std::fs::write(&path, "%PDF").unwrap();
        let mut source = FileSource::try_new("dim_card_details", spec(path.display().to_string())).unwrap();
        let (tx, _rx) = mpsc::channel(8);
        let err = source.run(tx, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SourceError::Format(_)));
    }
}
