//! OpenAI-compatible streaming client using eventsource-stream
//!
//! Posts to `{base_url}/chat/completions` with `stream: true` and converts each
//! SSE chunk into zero or more [`DeltaChunk`]s.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{CompletionClient, CompletionRequest, DeltaChunk, DeltaStream, TerminalReason};
use crate::config::UpstreamConfig;
use crate::error::{RelayError, Result};
use crate::types::ToolCallFragment;

/// OpenAI stream event structure
#[derive(Debug, Clone, Deserialize)]
struct OpenAiStreamEvent {
    choices: Option<Vec<OpenAiStreamChoice>>,
    error: Option<OpenAiStreamError>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiStreamChoice {
    delta: Option<OpenAiStreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCallDelta>>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiToolCallDelta {
    index: Option<usize>,
    id: Option<String>,
    function: Option<OpenAiFunctionCallDelta>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiFunctionCallDelta {
    name: Option<String>,
    arguments: Option<String>,
}

/// Error object some providers push mid-stream instead of failing the request.
#[derive(Debug, Clone, Deserialize)]
struct OpenAiStreamError {
    message: Option<String>,
    code: Option<Value>,
}

/// Convert one SSE `data` payload into delta chunks.
///
/// Only the first choice is read; the relay never requests `n > 1`.
fn convert_event(data: &str) -> Vec<Result<DeltaChunk>> {
    let event: OpenAiStreamEvent = match serde_json::from_str(data) {
        Ok(event) => event,
        Err(e) => {
            return vec![Err(RelayError::ParseError(format!(
                "Failed to parse upstream event: {e}"
            )))];
        }
    };

    if let Some(error) = event.error {
        let message = error
            .message
            .unwrap_or_else(|| "upstream reported an error".to_string());
        return vec![Err(RelayError::ApiError {
            code: 502,
            message,
            details: error.code,
        })];
    }

    let Some(choice) = event.choices.and_then(|c| c.into_iter().next()) else {
        return Vec::new();
    };

    let mut chunks = Vec::with_capacity(2);
    if let Some(delta) = choice.delta {
        if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
            chunks.push(Ok(DeltaChunk::Text(content)));
        }
        for (position, call) in delta.tool_calls.unwrap_or_default().into_iter().enumerate() {
            let function = call.function;
            chunks.push(Ok(DeltaChunk::ToolCall(ToolCallFragment {
                index: call.index.unwrap_or(position),
                id: call.id.filter(|id| !id.is_empty()),
                function_name: function
                    .as_ref()
                    .and_then(|f| f.name.clone())
                    .unwrap_or_default(),
                arguments_json: function.and_then(|f| f.arguments).unwrap_or_default(),
            })));
        }
    }
    if let Some(reason) = choice.finish_reason {
        chunks.push(Ok(DeltaChunk::Finish(TerminalReason::parse(&reason))));
    }
    chunks
}

/// OpenAI-compatible chat-completions client.
#[derive(Debug, Clone)]
pub struct OpenAiCompletionClient {
    base_url: String,
    api_key: SecretString,
    http_client: reqwest::Client,
}

impl OpenAiCompletionClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| RelayError::ConfigurationError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_client(config, http_client))
    }

    pub fn with_http_client(config: &UpstreamConfig, http_client: reqwest::Client) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: SecretString::from(config.api_key.expose_secret().to_string()),
            http_client,
        }
    }

    fn build_body(request: &CompletionRequest) -> Result<Value> {
        let mut body = json!({
            "model": request.model,
            "messages": serde_json::to_value(&request.messages)?,
            "stream": true,
        });
        if !request.tools.is_empty() {
            body["tools"] = serde_json::to_value(&request.tools)?;
            body["tool_choice"] = json!("auto");
        }
        if let Some(t) = request.sampling.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(max) = request.sampling.max_tokens {
            body["max_tokens"] = json!(max);
        }
        if let Some(p) = request.sampling.top_p {
            body["top_p"] = json!(p);
        }
        Ok(body)
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn stream_completion(&self, request: CompletionRequest) -> Result<DeltaStream> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::build_body(&request)?;
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "opening upstream stream"
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::HttpError(format!("Failed to send request: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RelayError::ApiError {
                code: status.as_u16(),
                message: error_text,
                details: None,
            });
        }

        let mut events = response.bytes_stream().eventsource();
        let stream = async_stream::stream! {
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => {
                        let data = event.data.trim();
                        if data == "[DONE]" {
                            break;
                        }
                        if data.is_empty() {
                            continue;
                        }
                        let mut failed = false;
                        for item in convert_event(data) {
                            failed |= item.is_err();
                            yield item;
                        }
                        if failed {
                            break;
                        }
                    }
                    Err(e) => {
                        yield Err(RelayError::StreamError(format!("SSE parsing error: {e}")));
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }
}
