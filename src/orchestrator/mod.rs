//! Streaming tool-augmented orchestration
//!
//! One [`Orchestrator::run`] drives a [`StreamSession`] through rounds:
//! stream a completion, forward text, accumulate tool calls, run them through
//! the quota guard and the dispatch table, splice the results into history,
//! and continue until the model stops.
//!
//! Every exit path writes a terminal pair to the wire: `final_message` +
//! `[DONE]` on completion or cancellation, `error` + `[DONE]` on upstream
//! failure. A closed wire ends the session without further writes.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::quota::{QuotaDecision, QuotaGuard};
use crate::server_adapters::{EventEmitter, SseOptions, WireEvent};
use crate::streaming::{DeltaAccumulator, RoundOutcome};
use crate::tools::{ToolContext, ToolRegistry};
use crate::types::{ConversationTurn, ToolInvocation, ToolResult};
use crate::upstream::{
    CompletionClient, CompletionRequest, DeltaChunk, DeltaStream, SamplingParams, TerminalReason,
};
use crate::utils::CancelHandle;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    StreamingText,
    AccumulatingTools,
    ExecutingTools,
    ContinuationStreaming,
    Done,
    Cancelled,
    Error,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Cancelled,
    Failed(String),
    /// The client went away; nothing more was written.
    Disconnected,
}

/// Per-request aggregate: history, round counter, cancel flag and output.
#[derive(Debug)]
pub struct StreamSession {
    pub id: String,
    pub context: ToolContext,
    history: Vec<ConversationTurn>,
    round: usize,
    state: SessionState,
    cancel: CancelHandle,
    output: String,
    images: Vec<String>,
    model: Option<String>,
    tools_enabled: Option<bool>,
}

impl StreamSession {
    pub fn new(user_id: impl Into<String>, history: Vec<ConversationTurn>) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        Self {
            context: ToolContext::new(user_id, id.clone()),
            id,
            history,
            round: 0,
            state: SessionState::StreamingText,
            cancel: CancelHandle::new(),
            output: String::new(),
            images: Vec::new(),
            model: None,
            tools_enabled: None,
        }
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self.context.session_id = self.id.clone();
        self
    }

    /// Override the configured upstream model for this session.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_tools_enabled(mut self, enabled: bool) -> Self {
        self.tools_enabled = Some(enabled);
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn round(&self) -> usize {
        self.round
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Assistant text streamed so far, across all rounds.
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn images(&self) -> &[String] {
        &self.images
    }
}

/// Orchestrator options
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub model: String,
    pub sampling: SamplingParams,
    /// Maximum upstream rounds per session, first round included.
    pub max_rounds: usize,
    pub tools_enabled: bool,
    pub truncation_note: String,
    pub channel_capacity: usize,
    pub sse: SseOptions,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from_config(&RelayConfig::default())
    }
}

impl OrchestratorOptions {
    pub fn from_config(config: &RelayConfig) -> Self {
        let upstream = &config.upstream;
        let orchestrator = &config.orchestrator;
        Self {
            model: upstream.model.clone(),
            sampling: SamplingParams {
                temperature: upstream.temperature,
                max_tokens: upstream.max_tokens,
                top_p: upstream.top_p,
            },
            max_rounds: orchestrator.max_rounds.max(1),
            tools_enabled: orchestrator.tools_enabled,
            truncation_note: orchestrator.truncation_note.clone(),
            channel_capacity: orchestrator.channel_capacity.max(1),
            sse: if orchestrator.mask_errors {
                SseOptions::production()
            } else {
                SseOptions::development()
            },
        }
    }
}

/// A spawned session: its frame receiver, cancel handle and task.
pub struct SessionHandle {
    pub session_id: String,
    pub frames: mpsc::Receiver<String>,
    pub cancel: CancelHandle,
    pub task: JoinHandle<SessionOutcome>,
}

enum RoundEnd {
    Finished(RoundOutcome),
    Cancelled,
    Failed(RelayError),
}

#[derive(Clone)]
pub struct Orchestrator {
    client: Arc<dyn CompletionClient>,
    tools: Arc<ToolRegistry>,
    quota: QuotaGuard,
    options: OrchestratorOptions,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("tools", &self.tools)
            .field("quota", &self.quota)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        tools: Arc<ToolRegistry>,
        quota: QuotaGuard,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            client,
            tools,
            quota,
            options,
        }
    }

    /// Run the session on its own task, writing frames into a fresh channel.
    pub fn spawn(self: &Arc<Self>, session: StreamSession) -> SessionHandle {
        let (tx, rx) = mpsc::channel(self.options.channel_capacity);
        let emitter = EventEmitter::new(tx).with_options(self.options.sse.clone());
        let session_id = session.id.clone();
        let cancel = session.cancel_handle();
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut session = session;
            this.run(&mut session, &emitter).await
        });
        SessionHandle {
            session_id,
            frames: rx,
            cancel,
            task,
        }
    }

    /// Drive `session` to a terminal state.
    pub async fn run(&self, session: &mut StreamSession, emitter: &EventEmitter) -> SessionOutcome {
        let span = tracing::info_span!(
            "session",
            session_id = %session.id,
            user_id = %session.context.user_id
        );
        async {
            tracing::info!(turns = session.history.len(), "session started");
            let outcome = match self.drive(session, emitter).await {
                Ok(outcome) => outcome,
                Err(RelayError::WireClosed) => {
                    tracing::info!(round = session.round, "client disconnected");
                    SessionOutcome::Disconnected
                }
                Err(e) => {
                    tracing::error!("session aborted: {}", e);
                    SessionOutcome::Failed(e.to_string())
                }
            };
            tracing::info!(?outcome, rounds = session.round, "session finished");
            outcome
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, session: &mut StreamSession, emitter: &EventEmitter) -> Result<SessionOutcome> {
        let tools_enabled =
            session.tools_enabled.unwrap_or(self.options.tools_enabled) && !self.tools.is_empty();
        let definitions = if tools_enabled {
            self.tools.definitions()
        } else {
            Vec::new()
        };
        let model = session
            .model
            .clone()
            .unwrap_or_else(|| self.options.model.clone());

        loop {
            if session.is_cancelled() {
                return self.finish_cancelled(session, emitter).await;
            }

            session.round += 1;
            session.state = if session.round == 1 {
                SessionState::StreamingText
            } else {
                SessionState::ContinuationStreaming
            };
            tracing::debug!(round = session.round, "opening upstream round");

            let request = CompletionRequest {
                model: model.clone(),
                messages: session.history.clone(),
                tools: definitions.clone(),
                sampling: self.options.sampling.clone(),
            };
            let cancel = session.cancel_handle();
            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                opened = self.client.stream_completion(request) => Some(opened),
            };
            let stream = match opened {
                Some(Ok(stream)) => stream,
                Some(Err(e)) => return self.finish_failed(session, emitter, e).await,
                None => return self.finish_cancelled(session, emitter).await,
            };

            let outcome = match self
                .stream_round(session, emitter, stream, tools_enabled)
                .await?
            {
                RoundEnd::Finished(outcome) => outcome,
                RoundEnd::Cancelled => return self.finish_cancelled(session, emitter).await,
                RoundEnd::Failed(e) => return self.finish_failed(session, emitter, e).await,
            };

            match outcome {
                RoundOutcome::Stop { text } => {
                    if !text.is_empty() {
                        session.history.push(ConversationTurn::assistant(text));
                    }
                    session.state = SessionState::Done;
                    emitter
                        .finish(session.output.clone(), session.images.clone())
                        .await?;
                    return Ok(SessionOutcome::Completed);
                }
                RoundOutcome::ToolCalls { text, calls } => {
                    if session.round >= self.options.max_rounds {
                        tracing::warn!(
                            round = session.round,
                            requested = calls.len(),
                            "tool round limit reached; forcing stop"
                        );
                        if !text.is_empty() {
                            session.history.push(ConversationTurn::assistant(text));
                        }
                        if !session.output.is_empty() {
                            session.output.push_str("\n\n");
                        }
                        session.output.push_str(&self.options.truncation_note);
                        session.state = SessionState::Done;
                        emitter
                            .finish(session.output.clone(), session.images.clone())
                            .await?;
                        return Ok(SessionOutcome::Completed);
                    }

                    session.state = SessionState::ExecutingTools;
                    session.history.push(ConversationTurn::assistant_with_tool_calls(
                        text,
                        calls.iter().map(|c| c.as_tool_call()).collect(),
                    ));

                    for call in calls {
                        if session.is_cancelled() {
                            return self.finish_cancelled(session, emitter).await;
                        }
                        let result = match call.invocation {
                            Ok(invocation) => match self.invoke(session, &invocation).await {
                                Some(result) => result,
                                None => return self.finish_cancelled(session, emitter).await,
                            },
                            Err(result) => result,
                        };
                        if session.is_cancelled() {
                            tracing::debug!(call_id = %result.tool_call_id, "discarding tool result after cancel");
                            return self.finish_cancelled(session, emitter).await;
                        }
                        session.images.extend(result.images.iter().cloned());
                        session
                            .history
                            .push(ConversationTurn::tool(&result.tool_call_id, result.content()));
                    }
                }
            }
        }
    }

    /// Consume one upstream stream. The stream is dropped (closing the
    /// connection) on every return path.
    async fn stream_round(
        &self,
        session: &mut StreamSession,
        emitter: &EventEmitter,
        mut stream: DeltaStream,
        tools_enabled: bool,
    ) -> Result<RoundEnd> {
        let cancel = session.cancel_handle();
        let mut acc = DeltaAccumulator::new();
        let mut reason: Option<TerminalReason> = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(RoundEnd::Cancelled),
                item = stream.next() => item,
            };
            let Some(item) = next else {
                break;
            };
            match item {
                Ok(DeltaChunk::Text(text)) => {
                    acc.apply_text(&text);
                    session.output.push_str(&text);
                    emitter.emit(WireEvent::Content(text)).await?;
                }
                Ok(DeltaChunk::ToolCall(fragment)) => {
                    if !tools_enabled {
                        tracing::debug!(index = fragment.index, "ignoring tool fragment; tools disabled");
                        continue;
                    }
                    if acc.apply_tool_call_fragment(fragment) {
                        session.state = SessionState::AccumulatingTools;
                        emitter.emit(WireEvent::ToolCall).await?;
                    }
                }
                Ok(DeltaChunk::Finish(r)) => {
                    reason = Some(r);
                    break;
                }
                Err(e) => return Ok(RoundEnd::Failed(e)),
            }
        }

        if reason.is_none() {
            tracing::debug!(round = session.round, "upstream ended without a terminal reason");
        }
        Ok(RoundEnd::Finished(acc.finalize(reason.as_ref())))
    }

    /// Quota check, dispatch, then record on success.
    ///
    /// Returns `None` when the session is cancelled while the quota snapshot
    /// is still being fetched.
    async fn invoke(&self, session: &StreamSession, invocation: &ToolInvocation) -> Option<ToolResult> {
        let tool = match self.tools.resolve(&invocation.name) {
            Ok(tool) => tool,
            Err(e) => return Some(ToolResult::failure(&invocation.id, &invocation.name, e)),
        };
        let user_id = session.context.user_id.as_str();

        let cancel = session.cancel_handle();
        let decision = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            decision = self.quota.authorize(user_id, tool) => decision,
        };
        if let QuotaDecision::Deny(reason) = decision {
            tracing::info!(tool = %tool, "tool denied: {}", reason);
            return Some(ToolResult::failure(&invocation.id, &invocation.name, reason));
        }

        let result = self.tools.dispatch(&session.context, invocation).await;
        if !result.is_error() {
            if let Err(e) = self.quota.record(user_id, tool).await {
                tracing::warn!(tool = %tool, "failed to record usage: {}", e);
            }
        }
        Some(result)
    }

    async fn finish_cancelled(
        &self,
        session: &mut StreamSession,
        emitter: &EventEmitter,
    ) -> Result<SessionOutcome> {
        tracing::info!(round = session.round, "session cancelled");
        session.state = SessionState::Cancelled;
        emitter
            .finish(session.output.clone(), session.images.clone())
            .await?;
        Ok(SessionOutcome::Cancelled)
    }

    async fn finish_failed(
        &self,
        session: &mut StreamSession,
        emitter: &EventEmitter,
        error: RelayError,
    ) -> Result<SessionOutcome> {
        tracing::error!(
            round = session.round,
            category = ?error.category(),
            retryable = error.is_retryable(),
            "upstream failure: {}",
            error
        );
        session.state = SessionState::Error;
        emitter.fail(&error).await?;
        Ok(SessionOutcome::Failed(error.to_string()))
    }
}
