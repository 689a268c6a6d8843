//! # Toolstream
//!
//! A streaming relay between chat clients and an OpenAI-compatible completion
//! endpoint. Text is re-streamed as it arrives; tool calls requested by the
//! model are accumulated across chunks, executed against HTTP tool services
//! under a per-user quota, and fed back for continuation rounds until the
//! model stops.
#![deny(unsafe_code)]

//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use toolstream::prelude::*;
//!
//! let config = RelayConfig::from_env()?;
//! let http = reqwest::Client::new();
//! let client = Arc::new(OpenAiCompletionClient::new(&config.upstream)?);
//! let tools = ToolRegistry::from_config(&config.tools, http, Arc::new(PassthroughAssetStore));
//! let quota = QuotaGuard::new(Arc::new(InMemoryQuotaStore::new(50)), 1.0);
//! let orchestrator = Arc::new(Orchestrator::new(
//!     client,
//!     Arc::new(tools),
//!     quota,
//!     OrchestratorOptions::from_config(&config),
//! ));
//!
//! let session = StreamSession::new("user-1", vec![ConversationTurn::user("Draw a cat")]);
//! let mut handle = orchestrator.spawn(session);
//! while let Some(frame) = handle.frames.recv().await {
//!     print!("{frame}");
//! }
//! ```

pub mod assets;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod quota;
pub mod server_adapters;
pub mod streaming;
pub mod telemetry;
pub mod tools;
pub mod types;
pub mod upstream;
pub mod utils;

pub use error::{RelayError, Result, ToolError};

/// Commonly used items
pub mod prelude {
    pub use crate::assets::{AssetStore, HttpAssetStore, PassthroughAssetStore};
    pub use crate::config::RelayConfig;
    pub use crate::error::{RelayError, Result, ToolError};
    pub use crate::orchestrator::{
        Orchestrator, OrchestratorOptions, SessionOutcome, SessionState, StreamSession,
    };
    pub use crate::quota::{HttpQuotaStore, InMemoryQuotaStore, QuotaGuard, QuotaStore};
    pub use crate::server_adapters::{EventEmitter, WireEvent};
    pub use crate::tools::{ToolContext, ToolHandler, ToolName, ToolRegistry};
    pub use crate::types::*;
    pub use crate::upstream::{CompletionClient, OpenAiCompletionClient};
    pub use crate::utils::CancelHandle;
}
