use anyhow::Result;
use async_trait::async_trait;
use mrdc_core::spec::RestSourceSpec;
use mrdc_core::{BatchTx, Message, Operator, Source, SourceError, send_batch};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{http, json_records};

/// A JSON endpoint, fetched once or page by page until a page comes back empty
pub struct RestSource {
    id: String,
    spec: RestSourceSpec,
    client: Client,
}

impl RestSource {
    pub fn try_new(table: &str, spec: RestSourceSpec) -> Result<Self> {
        Ok(Self {
            id: format!("{table}:rest"),
            spec,
            client: http::client()?,
        })
    }

    async fn fetch_page(&self, query: &[(&str, String)]) -> Result<arrow_array::RecordBatch, SourceError> {
        let payload = http::get_json(&self.client, &self.spec.url, self.spec.api_key.as_deref(), query).await?;
        let records = json_records::records_at(&payload, self.spec.records_pointer.as_deref())?;
        json_records::batch_from_payload(records)
    }
}

impl Operator for RestSource {
    fn name(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Source for RestSource {
    async fn run(&mut self, tx: BatchTx, cancel: CancellationToken) -> Result<(), SourceError> {
        info!(source = %self.id, url = %self.spec.url, "fetching");
        match &self.spec.pagination {
            None => {
                let batch = self.fetch_page(&[]).await?;
                send_batch(&tx, batch).await?;
            }
            Some(pages) => {
                let last = pages.first_page.saturating_add(pages.max_pages);
                let mut page = pages.first_page;
                loop {
                    if cancel.is_cancelled() {
                        return Ok(());
                    }
                    if page >= last {
                        warn!(source = %self.id, max_pages = pages.max_pages, "page limit reached");
                        break;
                    }
                    let batch = self
                        .fetch_page(&[(pages.page_param.as_str(), page.to_string())])
                        .await?;
                    debug!(source = %self.id, page, rows = batch.num_rows(), "page fetched");
                    if batch.num_rows() == 0 {
                        break;
                    }
                    send_batch(&tx, batch).await?;
                    page += 1;
                }
            }
        }
        tx.send(Message::Eos)
            .await
            .map_err(|_| SourceError::ChannelClosed("eos receiver dropped"))
    }
}
