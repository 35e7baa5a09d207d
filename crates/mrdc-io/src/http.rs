//! Shared HTTP plumbing for the REST, linked-JSON and document sources.

use std::time::Duration;

use mrdc_core::SourceError;
use reqwest::Client;
use serde_json::Value as Json;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn client() -> Result<Client, SourceError> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(SourceError::unavailable)
}

fn request(client: &Client, url: &str, api_key: Option<&str>) -> reqwest::RequestBuilder {
    let req = client.get(url);
    match api_key {
        Some(key) => req.header("x-api-key", key),
        None => req,
    }
}

/// GET `url` and return the body; any transport failure or non-success
/// status is transient
pub async fn get_bytes(
    client: &Client,
    url: &str,
    api_key: Option<&str>,
    query: &[(&str, String)],
) -> Result<Vec<u8>, SourceError> {
    debug!(url, "GET");
    let response = request(client, url, api_key)
        .query(query)
        .send()
        .await
        .map_err(|e| SourceError::Unavailable(format!("GET {url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Unavailable(format!(
            "GET {url}: request failed with status {status}"
        )));
    }
    let body = response
        .bytes()
        .await
        .map_err(|e| SourceError::Unavailable(format!("GET {url}: {e}")))?;
    Ok(body.to_vec())
}

/// GET `url` and parse the body as JSON; an empty body is `null`
pub async fn get_json(
    client: &Client,
    url: &str,
    api_key: Option<&str>,
    query: &[(&str, String)],
) -> Result<Json, SourceError> {
    let body = get_bytes(client, url, api_key, query).await?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Json::Null);
    }
    serde_json::from_slice(&body)
        .map_err(|e| SourceError::Format(format!("GET {url}: invalid JSON payload: {e}")))
}

pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}
