//! Upstream completion client
//!
//! One call opens one streaming request and yields a lazy, ordered, finite
//! sequence of [`DeltaChunk`]s. A transport or decoding failure arrives as a
//! single `Err` item, after which the stream ends.

pub mod openai;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

pub use openai::OpenAiCompletionClient;

use crate::error::RelayError;
use crate::types::{ConversationTurn, ToolCallFragment, ToolDefinition};

/// Why the upstream model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalReason {
    Stop,
    ToolCalls,
    Length,
    ContentFilter,
    Other(String),
}

impl TerminalReason {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "stop" => Self::Stop,
            "tool_calls" | "function_call" => Self::ToolCalls,
            "length" => Self::Length,
            "content_filter" => Self::ContentFilter,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One incremental unit of a streamed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaChunk {
    Text(String),
    ToolCall(ToolCallFragment),
    Finish(TerminalReason),
}

pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<DeltaChunk, RelayError>> + Send>>;

/// Sampling knobs forwarded verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplingParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

/// Everything needed to open one round.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ConversationTurn>,
    pub tools: Vec<ToolDefinition>,
    pub sampling: SamplingParams,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Open one streaming request. Errors opening the request are returned
    /// directly; later failures arrive as an `Err` item on the stream.
    async fn stream_completion(&self, request: CompletionRequest) -> Result<DeltaStream, RelayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_reasons() {
        assert_eq!(TerminalReason::parse("stop"), TerminalReason::Stop);
        assert_eq!(TerminalReason::parse("tool_calls"), TerminalReason::ToolCalls);
        assert_eq!(TerminalReason::parse("function_call"), TerminalReason::ToolCalls);
        assert_eq!(
            TerminalReason::parse("eos"),
            TerminalReason::Other("eos".into())
        );
    }
}
