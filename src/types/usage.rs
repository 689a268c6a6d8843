//! Per-user tool usage records owned by the identity service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Usage counters for one tool in the user's current subscription window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub tool: String,
    pub used: u64,
    pub limit: u64,
    /// End of the current window; `None` means the window never rolls over.
    #[serde(default)]
    pub window_end: Option<DateTime<Utc>>,
}

impl UsageRecord {
    pub fn new(tool: impl Into<String>, used: u64, limit: u64) -> Self {
        Self {
            tool: tool.into(),
            used,
            limit,
            window_end: None,
        }
    }

    pub fn with_window_end(mut self, window_end: DateTime<Utc>) -> Self {
        self.window_end = Some(window_end);
        self
    }

    /// Whether the window has rolled over at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.window_end.is_some_and(|end| end <= now)
    }
}
