//! Tool dispatch table
//!
//! A lookup table from [`ToolName`] to a [`ToolHandler`]. Dispatch never fails:
//! unknown names, invalid arguments, downstream errors and timeouts all come
//! back as an error [`ToolResult`].

mod catalog;
pub mod http;
pub mod image;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

pub use catalog::{ToolCategory, ToolName, all_definitions};
pub use http::HttpToolHandler;
pub use image::ImageGenerationHandler;

use crate::assets::AssetStore;
use crate::config::{ToolServiceConfig, ToolTimeouts};
use crate::error::ToolError;
use crate::types::{ToolDefinition, ToolInvocation, ToolResult};

/// Per-session identity passed explicitly to every tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolContext {
    pub user_id: String,
    pub session_id: String,
}

impl ToolContext {
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }
}

/// Successful tool output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub payload: Value,
    /// Durable media URLs produced by the call.
    pub images: Vec<String>,
}

impl ToolOutput {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            images: Vec::new(),
        }
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, ctx: &ToolContext, arguments: &Value) -> Result<ToolOutput, ToolError>;
}

/// Name to handler lookup table with per-category deadlines.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    handlers: HashMap<ToolName, Arc<dyn ToolHandler>>,
    timeouts: ToolTimeouts,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().map(|t| t.as_str()).collect();
        names.sort_unstable();
        f.debug_struct("ToolRegistry")
            .field("tools", &names)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl ToolRegistry {
    pub fn new(timeouts: ToolTimeouts) -> Self {
        Self {
            handlers: HashMap::new(),
            timeouts,
        }
    }

    /// Register every catalogue tool against its HTTP microservice.
    /// Image generation is wrapped so results point at durable storage.
    pub fn from_config(
        config: &ToolServiceConfig,
        http_client: reqwest::Client,
        assets: Arc<dyn AssetStore>,
    ) -> Self {
        let mut registry = Self::new(config.timeouts.clone());
        for tool in ToolName::ALL {
            let http = HttpToolHandler::new(tool, config.endpoint_for(tool), http_client.clone());
            let handler: Arc<dyn ToolHandler> = match tool {
                ToolName::GenerateImage => {
                    Arc::new(ImageGenerationHandler::new(http, assets.clone()))
                }
                _ => Arc::new(http),
            };
            registry.handlers.insert(tool, handler);
        }
        registry
    }

    pub fn register(&mut self, tool: ToolName, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(tool, handler);
    }

    pub fn with_handler(mut self, tool: ToolName, handler: Arc<dyn ToolHandler>) -> Self {
        self.register(tool, handler);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Definitions of the registered tools, in catalogue order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        ToolName::ALL
            .into_iter()
            .filter(|t| self.handlers.contains_key(t))
            .map(ToolName::definition)
            .collect()
    }

    /// Resolve a model-supplied name to a registered tool.
    pub fn resolve(&self, name: &str) -> Result<ToolName, ToolError> {
        let tool = ToolName::from_str(name)?;
        if self.handlers.contains_key(&tool) {
            Ok(tool)
        } else {
            Err(ToolError::UnknownTool(name.to_string()))
        }
    }

    /// Execute one invocation. Always yields a result carrying the invocation id.
    pub async fn dispatch(&self, ctx: &ToolContext, invocation: &ToolInvocation) -> ToolResult {
        match self.execute(ctx, invocation).await {
            Ok(output) => ToolResult::success(&invocation.id, &invocation.name, output.payload)
                .with_images(output.images),
            Err(error) => {
                tracing::warn!(
                    session_id = %ctx.session_id,
                    tool = %invocation.name,
                    call_id = %invocation.id,
                    "tool call failed: {}",
                    error
                );
                ToolResult::failure(&invocation.id, &invocation.name, error)
            }
        }
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        invocation: &ToolInvocation,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self.resolve(&invocation.name)?;
        let handler = self
            .handlers
            .get(&tool)
            .ok_or_else(|| ToolError::UnknownTool(invocation.name.clone()))?;
        tool.validate_arguments(&invocation.arguments)?;

        let deadline = self.timeouts.for_category(tool.category());
        tracing::debug!(tool = %tool, ?deadline, "dispatching tool");
        // Dropping the handler future on timeout aborts its in-flight request.
        match tokio::time::timeout(deadline, handler.call(ctx, &invocation.arguments)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                tool: tool.as_str().to_string(),
                seconds: deadline.as_secs(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, ctx: &ToolContext, arguments: &Value) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::new(json!({"user": ctx.user_id, "args": arguments})))
        }
    }

    struct Sleepy;

    #[async_trait]
    impl ToolHandler for Sleepy {
        async fn call(&self, _ctx: &ToolContext, _arguments: &Value) -> Result<ToolOutput, ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ToolOutput::default())
        }
    }

    fn invocation(name: &str, arguments: Value) -> ToolInvocation {
        ToolInvocation {
            id: "call_1".into(),
            name: name.into(),
            arguments,
        }
    }

    #[tokio::test]
    async fn dispatch_passes_context_and_keeps_call_id() {
        let registry = ToolRegistry::default().with_handler(ToolName::GetWeather, Arc::new(Echo));
        let ctx = ToolContext::new("u1", "s1");
        let result = registry
            .dispatch(&ctx, &invocation("getWeather", json!({"location": "Oslo"})))
            .await;
        assert_eq!(result.tool_call_id, "call_1");
        assert_eq!(result.outcome.unwrap()["user"], "u1");
    }

    #[tokio::test]
    async fn unknown_and_unregistered_tools_fail_softly() {
        let registry = ToolRegistry::default().with_handler(ToolName::GetWeather, Arc::new(Echo));
        let ctx = ToolContext::new("u1", "s1");

        let unknown = registry.dispatch(&ctx, &invocation("rmRf", json!({}))).await;
        assert_eq!(unknown.outcome, Err(ToolError::UnknownTool("rmRf".into())));

        let unregistered = registry
            .dispatch(&ctx, &invocation("searchWeb", json!({"query": "x"})))
            .await;
        assert!(unregistered.is_error());
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_the_handler() {
        let registry = ToolRegistry::default().with_handler(ToolName::GetWeather, Arc::new(Echo));
        let result = registry
            .dispatch(&ToolContext::new("u", "s"), &invocation("getWeather", json!({})))
            .await;
        assert!(matches!(result.outcome, Err(ToolError::InvalidArguments { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tool_times_out_by_category() {
        let registry = ToolRegistry::new(ToolTimeouts::default())
            .with_handler(ToolName::GetWeather, Arc::new(Sleepy));
        let result = registry
            .dispatch(
                &ToolContext::new("u", "s"),
                &invocation("getWeather", json!({"location": "Oslo"})),
            )
            .await;
        assert_eq!(
            result.outcome,
            Err(ToolError::Timeout {
                tool: "getWeather".into(),
                seconds: 10
            })
        );
    }

    #[test]
    fn definitions_follow_registration() {
        let registry = ToolRegistry::default()
            .with_handler(ToolName::SearchWeb, Arc::new(Echo))
            .with_handler(ToolName::GenerateImage, Arc::new(Echo));
        let names: Vec<_> = registry
            .definitions()
            .into_iter()
            .map(|d| d.function.name)
            .collect();
        assert_eq!(names, vec!["generateImage", "searchWeb"]);
    }
}
