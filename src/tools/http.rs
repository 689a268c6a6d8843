//! Tools backed by an HTTP microservice.

use async_trait::async_trait;
use serde_json::Value;

use super::{ToolContext, ToolHandler, ToolName, ToolOutput};
use crate::error::ToolError;

/// POSTs the arguments (plus caller identity) as JSON and returns the JSON reply.
#[derive(Debug, Clone)]
pub struct HttpToolHandler {
    tool: ToolName,
    endpoint: String,
    http_client: reqwest::Client,
}

impl HttpToolHandler {
    pub fn new(tool: ToolName, endpoint: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            tool,
            endpoint: endpoint.into(),
            http_client,
        }
    }

    pub fn tool(&self) -> ToolName {
        self.tool
    }

    fn request_body(&self, ctx: &ToolContext, arguments: &Value) -> Value {
        let mut body = arguments.as_object().cloned().unwrap_or_default();
        body.insert("user_id".to_string(), Value::String(ctx.user_id.clone()));
        Value::Object(body)
    }

    /// Run the request and return the raw JSON payload.
    pub async fn post(&self, ctx: &ToolContext, arguments: &Value) -> Result<Value, ToolError> {
        let tool = self.tool.as_str().to_string();
        let response = self
            .http_client
            .post(&self.endpoint)
            .header("x-session-id", &ctx.session_id)
            .json(&self.request_body(ctx, arguments))
            .send()
            .await
            .map_err(|e| ToolError::Transport {
                tool: tool.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(tool = %tool, status = status.as_u16(), "tool service rejected call");
            return Err(ToolError::Http {
                tool,
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| ToolError::Transport {
            tool: tool.clone(),
            reason: e.to_string(),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| ToolError::InvalidResponse {
            tool,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl ToolHandler for HttpToolHandler {
    async fn call(&self, ctx: &ToolContext, arguments: &Value) -> Result<ToolOutput, ToolError> {
        self.post(ctx, arguments).await.map(ToolOutput::new)
    }
}
