//! Image generation with durable storage of the result.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{HttpToolHandler, ToolContext, ToolHandler, ToolOutput};
use crate::assets::AssetStore;
use crate::error::ToolError;

/// Calls the image service, then swaps its ephemeral `url` for the stored one.
pub struct ImageGenerationHandler {
    inner: HttpToolHandler,
    assets: Arc<dyn AssetStore>,
}

impl ImageGenerationHandler {
    pub fn new(inner: HttpToolHandler, assets: Arc<dyn AssetStore>) -> Self {
        Self { inner, assets }
    }
}

#[async_trait]
impl ToolHandler for ImageGenerationHandler {
    async fn call(&self, ctx: &ToolContext, arguments: &Value) -> Result<ToolOutput, ToolError> {
        let mut payload = self.inner.post(ctx, arguments).await?;
        let ephemeral = payload
            .get("url")
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ToolError::InvalidResponse {
                tool: self.inner.tool().as_str().to_string(),
                reason: "missing image url".to_string(),
            })?;

        let stored = self
            .assets
            .persist(&ephemeral)
            .await
            .map_err(|e| ToolError::AssetStore(e.to_string()))?;

        if let Some(obj) = payload.as_object_mut() {
            obj.insert("url".to_string(), Value::String(stored.clone()));
        }
        Ok(ToolOutput {
            payload,
            images: vec![stored],
        })
    }
}
