//! Axum routes for the relay
//!
//! - `POST /v1/chat/stream` opens a session and streams its frames
//! - `POST /v1/chat/sessions/{session_id}/cancel` flips the session's cancel flag
//! - `GET /health`

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use super::frame_stream;
use crate::error::RelayError;
use crate::orchestrator::{Orchestrator, StreamSession};
use crate::types::ConversationTurn;
use crate::utils::CancelHandle;

/// Live sessions by id.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<String, CancelHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Returns `false` if the id is already live.
    pub fn insert(&self, session_id: &str, handle: CancelHandle) -> bool {
        let mut sessions = self.lock();
        if sessions.contains_key(session_id) {
            return false;
        }
        sessions.insert(session_id.to_string(), handle);
        true
    }

    pub fn remove(&self, session_id: &str) -> Option<CancelHandle> {
        self.lock().remove(session_id)
    }

    /// Request cancellation of a live session.
    pub fn cancel(&self, session_id: &str) -> bool {
        match self.lock().get(session_id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CancelHandle>> {
        // A panic while holding the lock cannot leave the map inconsistent.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            sessions: SessionRegistry::new(),
        }
    }
}

/// Body of `POST /v1/chat/stream`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatStreamRequest {
    pub user_id: String,
    pub messages: Vec<ConversationTurn>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tools_enabled: Option<bool>,
}

impl ChatStreamRequest {
    fn validate(&self) -> Result<(), RelayError> {
        if self.user_id.trim().is_empty() {
            return Err(RelayError::InvalidRequest("user_id is required".to_string()));
        }
        if self.messages.is_empty() {
            return Err(RelayError::InvalidRequest(
                "messages cannot be empty".to_string(),
            ));
        }
        if let Some(id) = &self.session_id {
            if id.trim().is_empty() {
                return Err(RelayError::InvalidRequest(
                    "session_id cannot be blank".to_string(),
                ));
            }
            // Echoed in `x-session-id` and forwarded to tool services.
            if HeaderValue::from_str(id).is_err() {
                return Err(RelayError::InvalidRequest(
                    "session_id must be a valid header value".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn into_session(self) -> StreamSession {
        let mut session = StreamSession::new(self.user_id, self.messages);
        if let Some(id) = self.session_id {
            session = session.with_session_id(id);
        }
        if let Some(model) = self.model {
            session = session.with_model(model);
        }
        if let Some(enabled) = self.tools_enabled {
            session = session.with_tools_enabled(enabled);
        }
        session
    }
}

/// JSON error response for rejected requests.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(error: RelayError) -> Self {
        let status =
            StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, error.user_message())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({"error": self.message}))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/stream", post(chat_stream))
        .route("/v1/chat/sessions/{session_id}/cancel", post(cancel_session))
        .route("/health", get(health))
        .with_state(state)
}

async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatStreamRequest>,
) -> Result<Response, ApiError> {
    request.validate()?;
    let session = request.into_session();
    let session_id = session.id.clone();

    if !state.sessions.insert(&session_id, session.cancel_handle()) {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            format!("session {session_id} is already streaming"),
        ));
    }

    let handle = state.orchestrator.spawn(session);
    let sessions = state.sessions.clone();
    let task = handle.task;
    let finished_id = session_id.clone();
    tokio::spawn(async move {
        match task.await {
            Ok(outcome) => tracing::debug!(session_id = %finished_id, ?outcome, "session task ended"),
            Err(e) => tracing::error!(session_id = %finished_id, "session task panicked: {}", e),
        }
        sessions.remove(&finished_id);
    });

    let body = Body::from_stream(frame_stream(handle.frames));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("x-session-id", session_id)
        .body(body)
        .map_err(|e| ApiError::from(RelayError::InternalError(e.to_string())))
}

async fn cancel_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> StatusCode {
    if state.sessions.cancel(&session_id) {
        tracing::info!(session_id = %session_id, "cancellation requested");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "active_sessions": state.sessions.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_cancels_live_sessions_only() {
        let registry = SessionRegistry::new();
        let handle = CancelHandle::new();
        assert!(registry.insert("s1", handle.clone()));
        assert!(!registry.insert("s1", CancelHandle::new()));
        assert!(registry.cancel("s1"));
        assert!(handle.is_cancelled());
        assert!(!registry.cancel("missing"));
        registry.remove("s1");
        assert!(registry.is_empty());
    }

    #[test]
    fn request_validation() {
        let request: ChatStreamRequest = serde_json::from_value(json!({
            "user_id": "",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();
        assert!(matches!(request.validate(), Err(RelayError::InvalidRequest(_))));

        let request: ChatStreamRequest = serde_json::from_value(json!({
            "user_id": "u1",
            "messages": [{"role": "user", "content": "hi"}],
            "session_id": "abc",
            "tools_enabled": false
        }))
        .unwrap();
        assert!(request.validate().is_ok());
        let session = request.into_session();
        assert_eq!(session.id, "abc");
        assert_eq!(session.context.session_id, "abc");
    }

    #[test]
    fn session_id_must_fit_in_a_header() {
        let request: ChatStreamRequest = serde_json::from_value(json!({
            "user_id": "u1",
            "messages": [{"role": "user", "content": "hi"}],
            "session_id": "bad\nid"
        }))
        .unwrap();
        assert!(matches!(request.validate(), Err(RelayError::InvalidRequest(_))));
    }
}
