//! Core error types.

use thiserror::Error;

/// Coarse grouping of session errors, used for logging and status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Server,
    Client,
    Parsing,
    Configuration,
    Internal,
}

/// Session-level error.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Transport failure before or while talking to a remote service.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// A remote service answered with a non-success status.
    #[error("API error {code}: {message}")]
    ApiError {
        code: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// The upstream event stream broke mid-flight.
    #[error("Stream error: {0}")]
    StreamError(String),

    /// A payload could not be decoded.
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The inbound client request is unusable.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The client connection is gone; nothing more can be written.
    #[error("client connection closed")]
    WireClosed,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl RelayError {
    pub fn api_error(code: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::HttpError(_) | Self::StreamError(_) | Self::TimeoutError(_) => {
                ErrorCategory::Network
            }
            Self::ApiError { code, .. } if *code >= 500 => ErrorCategory::Server,
            Self::ApiError { .. } | Self::InvalidRequest(_) | Self::WireClosed => {
                ErrorCategory::Client
            }
            Self::ParseError(_) => ErrorCategory::Parsing,
            Self::ConfigurationError(_) => ErrorCategory::Configuration,
            Self::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// Whether a fresh attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpError(_) | Self::StreamError(_) | Self::TimeoutError(_) => true,
            Self::ApiError { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }

    /// Message suitable for the client-facing `error` event.
    pub fn user_message(&self) -> String {
        match self {
            Self::ApiError { code, message, .. } => {
                format!("Upstream provider returned {code}: {message}")
            }
            Self::TimeoutError(_) => "Upstream provider timed out".to_string(),
            Self::WireClosed => "client connection closed".to_string(),
            other => other.to_string(),
        }
    }

    /// HTTP status the server surface answers with for a rejected request.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::ApiError { code, .. } => *code,
            Self::TimeoutError(_) => 504,
            Self::ConfigurationError(_) | Self::InternalError(_) => 500,
            _ => 502,
        }
    }
}

/// Failure of a single tool invocation.
///
/// Always recovered locally: the orchestrator renders it into the tool result
/// `{"error": true, "message": ...}` so the model can explain it to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for tool {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// `argumentsJson` did not parse; the tool is never invoked.
    #[error("Malformed arguments for tool {tool}: {reason}")]
    MalformedArguments { tool: String, reason: String },

    #[error("Not enough credits for tool: {0}")]
    QuotaDenied(String),

    #[error("Unable to verify credits for tool: {0}")]
    QuotaUnavailable(String),

    #[error("Tool {tool} failed with status {status}")]
    Http { tool: String, status: u16 },

    #[error("Tool {tool} request failed: {reason}")]
    Transport { tool: String, reason: String },

    #[error("Tool {tool} timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },

    #[error("Tool {tool} returned an invalid response: {reason}")]
    InvalidResponse { tool: String, reason: String },

    #[error("Failed to store generated asset: {0}")]
    AssetStore(String),
}

impl ToolError {
    /// JSON payload fed back to the model as the tool turn content.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "error": true,
            "message": self.to_string(),
        })
    }
}
