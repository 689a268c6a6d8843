//! Durable asset storage for generated media.
//!
//! Upstream media URLs are short-lived; anything surfaced to the client or
//! written into history must point at the durable copy.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{RelayError, Result};

#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Copy the asset behind `ephemeral_url` to durable storage and return its new URL.
    async fn persist(&self, ephemeral_url: &str) -> Result<String>;
}

/// Asset store backed by an HTTP service.
///
/// `POST {base_url}/assets` with `{"url": ephemeral}` answers `{"url": stored}`.
#[derive(Debug, Clone)]
pub struct HttpAssetStore {
    base_url: String,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct PersistResponse {
    url: String,
}

impl HttpAssetStore {
    pub fn new(base_url: &str, http_client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        }
    }
}

#[async_trait]
impl AssetStore for HttpAssetStore {
    async fn persist(&self, ephemeral_url: &str) -> Result<String> {
        let response = self
            .http_client
            .post(format!("{}/assets", self.base_url))
            .json(&serde_json::json!({ "url": ephemeral_url }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::api_error(status.as_u16(), body));
        }
        let body: PersistResponse = response.json().await?;
        if body.url.is_empty() {
            return Err(RelayError::ParseError(
                "asset store returned an empty url".to_string(),
            ));
        }
        tracing::debug!(stored = %body.url, "persisted generated asset");
        Ok(body.url)
    }
}

/// Keeps upstream URLs unchanged. For local development only.
#[derive(Debug, Clone, Default)]
pub struct PassthroughAssetStore;

#[async_trait]
impl AssetStore for PassthroughAssetStore {
    async fn persist(&self, ephemeral_url: &str) -> Result<String> {
        Ok(ephemeral_url.to_string())
    }
}
