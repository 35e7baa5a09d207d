use anyhow::{Result, bail};
use async_trait::async_trait;
use futures::{StreamExt, stream};
use mrdc_core::batch::records_from_json;
use mrdc_core::spec::LinkedJsonSourceSpec;
use mrdc_core::{BatchTx, Message, Operator, Source, SourceError, send_batch};
use reqwest::Client;
use serde_json::Value as Json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{http, json_records};

/// Read the item count out of a count response
///
/// Accepts a bare number, a numeric string, or an object holding either
/// under `field`.
pub fn item_count(payload: &Json, field: &str) -> Result<u64, SourceError> {
    let value = match payload {
        Json::Object(map) => map
            .get(field)
            .ok_or_else(|| SourceError::Format(format!("count response has no `{field}` field")))?,
        other => other,
    };
    match value {
        Json::Number(n) => n.as_u64(),
        Json::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
    .ok_or_else(|| SourceError::Format(format!("`{field}` is not a non-negative integer: {value}")))
}

/// Expand `{n}` in `template` for `0..count`
pub fn expand_links(template: &str, count: u64) -> Vec<String> {
    (0..count).map(|n| template.replace("{n}", &n.to_string())).collect()
}

/// A collection fetched item by item and merged into one table
pub struct LinkedJsonSource {
    id: String,
    spec: LinkedJsonSourceSpec,
    client: Client,
}

impl LinkedJsonSource {
    pub fn try_new(table: &str, spec: LinkedJsonSourceSpec) -> Result<Self> {
        let templated = spec.count_url.is_some() && spec.item_url_template.is_some();
        if spec.links.is_empty() && !templated {
            bail!("linked_json source for `{table}` needs `links` or both `count_url` and `item_url_template`");
        }
        if let Some(template) = &spec.item_url_template {
            if !template.contains("{n}") {
                bail!("item_url_template `{template}` has no `{{n}}` placeholder");
            }
        }
        Ok(Self {
            id: format!("{table}:linked_json"),
            spec,
            client: http::client()?,
        })
    }

    async fn links(&self) -> Result<Vec<String>, SourceError> {
        if !self.spec.links.is_empty() {
            return Ok(self.spec.links.clone());
        }
        let (Some(count_url), Some(template)) = (&self.spec.count_url, &self.spec.item_url_template) else {
            return Ok(Vec::new());
        };
        let payload = http::get_json(&self.client, count_url, self.spec.api_key.as_deref(), &[]).await?;
        let count = item_count(&payload, &self.spec.count_field)?;
        info!(source = %self.id, count, "item count");
        Ok(expand_links(template, count))
    }
}

impl Operator for LinkedJsonSource {
    fn name(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Source for LinkedJsonSource {
    async fn run(&mut self, tx: BatchTx, cancel: CancellationToken) -> Result<(), SourceError> {
        let links = self.links().await?;
        let client = &self.client;
        let api_key = self.spec.api_key.as_deref();

        let fetches: Vec<_> = links
            .iter()
            .map(|url| async move { (url, http::get_json(client, url, api_key, &[]).await) })
            .collect();
        let mut items = stream::iter(fetches)
            .buffered(self.spec.fetch_concurrency.max(1));

        let batch_rows = self.spec.batch_rows.max(1);
        let mut pending: Vec<Json> = Vec::with_capacity(batch_rows.min(links.len()));
        let mut empty = 0usize;
        while let Some((url, payload)) = items.next().await {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let records = json_records::payload_records(&payload?)?;
            if records.is_empty() {
                empty += 1;
                warn!(source = %self.id, url = %url, "empty item response");
                continue;
            }
            pending.extend(records);
            if pending.len() >= batch_rows {
                send_batch(&tx, records_from_json(&pending)?).await?;
                pending.clear();
            }
        }
        if !pending.is_empty() {
            send_batch(&tx, records_from_json(&pending)?).await?;
        }
        info!(source = %self.id, items = links.len(), empty, "collection fetched");

        tx.send(Message::Eos)
            .await
            .map_err(|_| SourceError::ChannelClosed("eos receiver dropped"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn count_shapes() {
        assert_eq!(item_count(&json!({"name": "x", "number_stores": 451}), "number_stores").unwrap(), 451);
        assert_eq!(item_count(&json!({"number_stores": "12"}), "number_stores").unwrap(), 12);
        assert_eq!(item_count(&json!(3), "number_stores").unwrap(), 3);
        assert!(item_count(&json!({"stores": 3}), "number_stores").is_err());
        assert!(item_count(&json!({"number_stores": -1}), "number_stores").is_err());
    }

    #[test]
    fn links_from_template() {
        let links = expand_links("https://api.example.com/store_details/{n}", 3);
        assert_eq!(links.len(), 3);
        assert_eq!(links[2], "https://api.example.com/store_details/2");
        assert!(expand_links("x/{n}", 0).is_empty());
    }

    #[test]
    fn construction_needs_links_or_a_template() {
        let spec = |links: Vec<String>, template: Option<&str>| LinkedJsonSourceSpec {
            links,
            count_url: Some("https://api.example.com/number_stores".into()),
            count_field: "number_stores".into(),
            item_url_template: template.map(String::from),
            api_key: None,
            fetch_concurrency: 4,
            batch_rows: 100,
        };
        assert!(LinkedJsonSource::try_new("dim_store_details", spec(vec![], None)).is_err());
        assert!(LinkedJsonSource::try_new("dim_store_details", spec(vec![], Some("x/store"))).is_err());
        assert!(LinkedJsonSource::try_new("dim_store_details", spec(vec![], Some("x/{n}"))).is_ok());
        assert!(LinkedJsonSource::try_new("dim_store_details", spec(vec!["x/1".into()], None)).is_ok());
    }
}
