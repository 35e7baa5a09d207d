use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use mrdc_core::spec::{FileFormat, ObjectStoreSourceSpec};
use mrdc_core::{BatchTx, Message, Operator, Source, SourceError, send_batch};
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{chunk, csv_text, json_records};

/// Split `s3://bucket/key/parts` into bucket and key
pub fn parse_s3_uri(uri: &str) -> Result<(String, String)> {
    let Some(rest) = uri.strip_prefix("s3://") else {
        bail!("object store uri must start with s3://, got `{uri}`");
    };
    match rest.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
            Ok((bucket.to_string(), key.to_string()))
        }
        _ => bail!("object store uri must name a bucket and a key, got `{uri}`"),
    }
}

/// A CSV or JSON object in an S3-compatible store
pub struct ObjectStoreSource {
    id: String,
    store: Arc<dyn ObjectStore>,
    key: Path,
    format: FileFormat,
    batch_rows: usize,
}

impl ObjectStoreSource {
    /// Build an S3 client from the environment, overridden by explicit settings
    pub fn try_new(table: &str, spec: ObjectStoreSourceSpec) -> Result<Self> {
        let (bucket, key) = parse_s3_uri(&spec.uri)?;
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(&bucket);
        if let Some(endpoint) = &spec.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        if let Some(region) = &spec.region {
            builder = builder.with_region(region);
        }
        if let (Some(access), Some(secret)) = (&spec.access_key, &spec.secret_key) {
            builder = builder
                .with_access_key_id(access)
                .with_secret_access_key(secret);
        }
        let store = builder
            .build()
            .with_context(|| format!("configure object store for bucket `{bucket}`"))?;
        Ok(Self::with_store(table, Arc::new(store), &key, spec.batch_rows))
    }

    /// Read from an already-configured store (e.g. an in-memory one)
    pub fn with_store(table: &str, store: Arc<dyn ObjectStore>, key: &str, batch_rows: usize) -> Self {
        Self {
            id: format!("{table}:object_store"),
            store,
            key: Path::from(key),
            format: FileFormat::from_extension(key).unwrap_or(FileFormat::Csv),
            batch_rows,
        }
    }
}

impl Operator for ObjectStoreSource {
    fn name(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Source for ObjectStoreSource {
    async fn run(&mut self, tx: BatchTx, cancel: CancellationToken) -> Result<(), SourceError> {
        info!(source = %self.id, key = %self.key, "fetching object");
        let bytes = self
            .store
            .get(&self.key)
            .await
            .map_err(|e| SourceError::Unavailable(format!("get {}: {e}", self.key)))?
            .bytes()
            .await
            .map_err(|e| SourceError::Unavailable(format!("read {}: {e}", self.key)))?;

        if cancel.is_cancelled() {
            return Ok(());
        }

        let batches = match self.format {
            FileFormat::Csv => csv_text::read_csv(&bytes, self.batch_rows)?,
            FileFormat::Json => {
                let text = String::from_utf8_lossy(&bytes);
                let payload = json_records::parse_json_text(&text)?;
                chunk(json_records::batch_from_payload(&payload)?, self.batch_rows)
            }
        };
        for batch in batches {
            send_batch(&tx, batch).await?;
        }
        tx.send(Message::Eos)
            .await
            .map_err(|_| SourceError::ChannelClosed("eos receiver dropped"))
    }
}
