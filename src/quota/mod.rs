//! Quota guard
//!
//! Decides whether a user may run a tool, from a snapshot of usage records
//! owned by the identity service, and reports usage after a successful run.

mod store;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

pub use store::{HttpQuotaStore, InMemoryQuotaStore, QuotaStore};

use crate::error::{RelayError, Result, ToolError};
use crate::tools::ToolName;
use crate::types::UsageRecord;

/// Default deadline for one identity service call.
pub const DEFAULT_QUOTA_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a quota check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    Allow,
    Deny(ToolError),
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Enforces per-tool limits scaled by the subscription window factor.
#[derive(Clone)]
pub struct QuotaGuard {
    store: Arc<dyn QuotaStore>,
    window_scaling_factor: f64,
    timeout: Duration,
}

impl std::fmt::Debug for QuotaGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaGuard")
            .field("window_scaling_factor", &self.window_scaling_factor)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl QuotaGuard {
    pub fn new(store: Arc<dyn QuotaStore>, window_scaling_factor: f64) -> Self {
        Self {
            store,
            window_scaling_factor,
            timeout: DEFAULT_QUOTA_TIMEOUT,
        }
    }

    /// Deadline for each call to the store.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Allow/deny `tool` against `snapshot` as of now.
    pub fn check(&self, snapshot: &[UsageRecord], tool: ToolName) -> QuotaDecision {
        self.check_at(snapshot, tool, Utc::now())
    }

    /// Deterministic form of [`check`](Self::check): same inputs, same decision.
    ///
    /// Tools without a record are unmetered. A record whose window ended at or
    /// before `now` counts as a fresh window.
    pub fn check_at(
        &self,
        snapshot: &[UsageRecord],
        tool: ToolName,
        now: DateTime<Utc>,
    ) -> QuotaDecision {
        let Some(record) = snapshot.iter().find(|r| r.tool == tool.as_str()) else {
            return QuotaDecision::Allow;
        };
        if record.is_expired(now) {
            return QuotaDecision::Allow;
        }
        let ceiling = record.limit as f64 * self.window_scaling_factor;
        if record.used as f64 >= ceiling {
            QuotaDecision::Deny(ToolError::QuotaDenied(tool.as_str().to_string()))
        } else {
            QuotaDecision::Allow
        }
    }

    /// Fetch the user's snapshot and check `tool` against it.
    ///
    /// A snapshot that cannot be fetched before the deadline denies the call.
    pub async fn authorize(&self, user_id: &str, tool: ToolName) -> QuotaDecision {
        let snapshot = tokio::time::timeout(self.timeout, self.store.usage_snapshot(user_id))
            .await
            .unwrap_or_else(|_| Err(self.timed_out("usage snapshot")));
        match snapshot {
            Ok(snapshot) => self.check(&snapshot, tool),
            Err(e) => {
                tracing::warn!(user_id, tool = %tool, "usage snapshot unavailable: {}", e);
                QuotaDecision::Deny(ToolError::QuotaUnavailable(tool.as_str().to_string()))
            }
        }
    }

    /// Report one successful use of `tool`.
    pub async fn record(&self, user_id: &str, tool: ToolName) -> Result<()> {
        tokio::time::timeout(self.timeout, self.store.record_usage(user_id, tool.as_str()))
            .await
            .unwrap_or_else(|_| Err(self.timed_out("usage record")))
    }

    fn timed_out(&self, what: &str) -> RelayError {
        RelayError::TimeoutError(format!("{what} exceeded {}ms", self.timeout.as_millis()))
    }
}
