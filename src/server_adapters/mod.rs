//! Server adapters: the client-facing wire protocol
//!
//! Every session writes SSE-style frames (`data: <json>\n\n`) through one
//! [`EventEmitter`]. The last frame of every session is `data: [DONE]`.
//!
//! ## Frames
//!
//! - `{"content": "..."}` - one per upstream text delta
//! - `{"tool_call": true}` - a tool call started accumulating
//! - `{"final_message": {"content": "...", "images": [...]}}` - once, on completion or cancellation
//! - `{"error": "..."}` - unrecoverable upstream failure
//! - `[DONE]`

use std::pin::Pin;

use futures::Stream;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::{RelayError, Result};

#[cfg(feature = "server")]
pub mod axum;

/// Options for error frames.
#[derive(Debug, Clone)]
pub struct SseOptions {
    /// Replace upstream error details with a generic message.
    pub mask_errors: bool,
    /// Message used when `mask_errors` is set. Defaults to "internal error".
    pub masked_error_message: Option<String>,
}

impl Default for SseOptions {
    fn default() -> Self {
        Self::development()
    }
}

impl SseOptions {
    /// Errors reach the client verbatim.
    pub fn development() -> Self {
        Self {
            mask_errors: false,
            masked_error_message: None,
        }
    }

    /// Errors are masked.
    pub fn production() -> Self {
        Self {
            mask_errors: true,
            masked_error_message: None,
        }
    }

    fn error_text(&self, error: &RelayError) -> String {
        if self.mask_errors {
            self.masked_error_message
                .clone()
                .unwrap_or_else(|| "internal error".to_string())
        } else {
            error.user_message()
        }
    }
}

/// One frame of the outbound protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum WireEvent {
    Content(String),
    ToolCall,
    FinalMessage { content: String, images: Vec<String> },
    Error(String),
    Done,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Frame<'a> {
    Content { content: &'a str },
    ToolCall { tool_call: bool },
    Final { final_message: FinalMessage<'a> },
    Error { error: &'a str },
}

#[derive(Serialize)]
struct FinalMessage<'a> {
    content: &'a str,
    images: &'a [String],
}

impl WireEvent {
    /// Encode as one complete frame, trailing blank line included.
    pub fn encode(&self) -> String {
        let frame = match self {
            Self::Content(content) => Frame::Content { content },
            Self::ToolCall => Frame::ToolCall { tool_call: true },
            Self::FinalMessage { content, images } => Frame::Final {
                final_message: FinalMessage { content, images },
            },
            Self::Error(error) => Frame::Error { error },
            Self::Done => return "data: [DONE]\n\n".to_string(),
        };
        // Serializing borrowed strings and bools cannot fail.
        let data = serde_json::to_string(&frame).unwrap_or_else(|_| "{}".to_string());
        format!("data: {data}\n\n")
    }
}

/// Sole writer to a session's output sink.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    sink: mpsc::Sender<String>,
    options: SseOptions,
}

impl EventEmitter {
    pub fn new(sink: mpsc::Sender<String>) -> Self {
        Self {
            sink,
            options: SseOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SseOptions) -> Self {
        self.options = options;
        self
    }

    /// Write one frame. Fails with [`RelayError::WireClosed`] once the reader is gone.
    pub async fn emit(&self, event: WireEvent) -> Result<()> {
        tracing::trace!(?event, "emit");
        self.sink
            .send(event.encode())
            .await
            .map_err(|_| RelayError::WireClosed)
    }

    /// Emit the `final_message` + `[DONE]` pair.
    pub async fn finish(&self, content: String, images: Vec<String>) -> Result<()> {
        self.emit(WireEvent::FinalMessage { content, images }).await?;
        self.emit(WireEvent::Done).await
    }

    /// Emit the `error` + `[DONE]` pair.
    pub async fn fail(&self, error: &RelayError) -> Result<()> {
        self.emit(WireEvent::Error(self.options.error_text(error)))
            .await?;
        self.emit(WireEvent::Done).await
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_closed()
    }
}

/// Turn the receiving half of an emitter channel into a body stream.
pub fn frame_stream(
    mut frames: mpsc::Receiver<String>,
) -> Pin<Box<dyn Stream<Item = std::result::Result<String, std::convert::Infallible>> + Send>> {
    let s = async_stream::stream! {
        while let Some(frame) = frames.recv().await {
            yield Ok(frame);
        }
    };
    Box::pin(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn frames_are_exact() {
        assert_eq!(
            WireEvent::Content("Hel".into()).encode(),
            "data: {\"content\":\"Hel\"}\n\n"
        );
        assert_eq!(WireEvent::ToolCall.encode(), "data: {\"tool_call\":true}\n\n");
        assert_eq!(
            WireEvent::FinalMessage {
                content: "Hello".into(),
                images: vec![]
            }
            .encode(),
            "data: {\"final_message\":{\"content\":\"Hello\",\"images\":[]}}\n\n"
        );
        assert_eq!(
            WireEvent::Error("boom".into()).encode(),
            "data: {\"error\":\"boom\"}\n\n"
        );
        assert_eq!(WireEvent::Done.encode(), "data: [DONE]\n\n");
    }

    #[test]
    fn content_is_json_escaped() {
        assert_eq!(
            WireEvent::Content("line\n\"q\"".into()).encode(),
            "data: {\"content\":\"line\\n\\\"q\\\"\"}\n\n"
        );
    }

    #[tokio::test]
    async fn emitter_reports_closed_wire() {
        let (tx, rx) = mpsc::channel(4);
        let emitter = EventEmitter::new(tx);
        drop(rx);
        assert!(matches!(
            emitter.emit(WireEvent::Done).await,
            Err(RelayError::WireClosed)
        ));
        assert!(emitter.is_closed());
    }

    #[tokio::test]
    async fn masked_errors_hide_details() {
        let (tx, rx) = mpsc::channel(4);
        let emitter = EventEmitter::new(tx).with_options(SseOptions::production());
        emitter
            .fail(&RelayError::HttpError("secret host unreachable".into()))
            .await
            .unwrap();
        drop(emitter);
        let frames: Vec<String> = frame_stream(rx).map(|f| f.unwrap()).collect().await;
        assert_eq!(
            frames,
            vec![
                "data: {\"error\":\"internal error\"}\n\n".to_string(),
                "data: [DONE]\n\n".to_string()
            ]
        );
    }
}
