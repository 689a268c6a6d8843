//! Tool calling types: wire-level calls, streamed fragments, invocations and results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;

/// A tool call as recorded on an assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub r#type: String,
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn function(id: impl Into<String>, function: FunctionCall) -> Self {
        Self {
            id: id.into(),
            r#type: "function".to_string(),
            function,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Raw JSON text exactly as streamed by the model.
    pub arguments: String,
}

/// Tool definition advertised to the upstream model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub r#type: String,
    pub function: ToolFunction,
}

impl ToolDefinition {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            r#type: "function".to_string(),
            function: ToolFunction {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFunction {
    pub name: String,
    pub description: String,
    /// JSON schema for the arguments object
    pub parameters: Value,
}

/// One streamed piece of a tool call.
///
/// Fragments sharing an `index` are merged by concatenating `function_name`
/// and `arguments_json` in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallFragment {
    pub index: usize,
    pub id: Option<String>,
    pub function_name: String,
    pub arguments_json: String,
}

/// A tool call whose arguments parsed as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Outcome of executing (or refusing) one tool call.
///
/// Produced for every finalized call, success or failure; never dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub outcome: Result<Value, ToolError>,
    /// Durable media references produced by the call.
    pub images: Vec<String>,
}

impl ToolResult {
    pub fn success(tool_call_id: impl Into<String>, tool_name: impl Into<String>, payload: Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            outcome: Ok(payload),
            images: Vec::new(),
        }
    }

    pub fn failure(tool_call_id: impl Into<String>, tool_name: impl Into<String>, error: ToolError) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            outcome: Err(error),
            images: Vec::new(),
        }
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }

    /// JSON text placed in the tool turn.
    pub fn content(&self) -> String {
        match &self.outcome {
            Ok(payload) => payload.to_string(),
            Err(error) => error.to_payload().to_string(),
        }
    }
}
