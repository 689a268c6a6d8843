//! Error Handling Module
//!
//! Two error families live here:
//! - `RelayError`: session-level failures (upstream transport, configuration,
//!   client wire). An upstream failure is fatal to the session and is flushed
//!   to the client as an `error` event.
//! - `ToolError`: failures of a single tool invocation. These never escape the
//!   orchestrator; they are turned into a tool result and fed back to the model.
//!
//! # Example
//!
//! ```rust,ignore
//! use toolstream::error::{ErrorCategory, RelayError};
//!
//! let error = RelayError::api_error(502, "bad gateway");
//! assert_eq!(error.category(), ErrorCategory::Server);
//! assert!(error.is_retryable());
//! ```

mod conversions;
pub mod types;

pub use types::*;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, RelayError>;
