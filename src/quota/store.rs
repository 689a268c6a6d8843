//! Usage record stores.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{RelayError, Result};
use crate::types::UsageRecord;

/// The identity/quota collaborator.
///
/// Implementations must make `record_usage` safe under concurrent sessions
/// of the same user.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    async fn usage_snapshot(&self, user_id: &str) -> Result<Vec<UsageRecord>>;
    async fn record_usage(&self, user_id: &str, tool: &str) -> Result<()>;
}

/// Identity service client.
///
/// - `GET {base}/users/{id}/usage` returns `[UsageRecord]`
/// - `POST {base}/users/{id}/usage` with `{"tool": name}` increments atomically server-side
#[derive(Debug, Clone)]
pub struct HttpQuotaStore {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpQuotaStore {
    pub fn new(base_url: &str, http_client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        }
    }

    /// The user id is one opaque path segment.
    fn usage_url(&self, user_id: &str) -> String {
        format!(
            "{}/users/{}/usage",
            self.base_url,
            urlencoding::encode(user_id)
        )
    }
}

#[async_trait]
impl QuotaStore for HttpQuotaStore {
    async fn usage_snapshot(&self, user_id: &str) -> Result<Vec<UsageRecord>> {
        let response = self.http_client.get(self.usage_url(user_id)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::api_error(status.as_u16(), body));
        }
        Ok(response.json().await?)
    }

    async fn record_usage(&self, user_id: &str, tool: &str) -> Result<()> {
        let response = self
            .http_client
            .post(self.usage_url(user_id))
            .json(&serde_json::json!({ "tool": tool }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::api_error(status.as_u16(), body));
        }
        Ok(())
    }
}

/// Process-local store with one uniform limit per tool.
#[derive(Debug, Default)]
pub struct InMemoryQuotaStore {
    default_limit: u64,
    // user -> tool -> used
    usage: Mutex<HashMap<String, HashMap<String, u64>>>,
    limits: HashMap<String, u64>,
}

impl InMemoryQuotaStore {
    pub fn new(default_limit: u64) -> Self {
        Self {
            default_limit,
            usage: Mutex::new(HashMap::new()),
            limits: HashMap::new(),
        }
    }

    /// Override the limit for one tool.
    pub fn with_limit(mut self, tool: &str, limit: u64) -> Self {
        self.limits.insert(tool.to_string(), limit);
        self
    }

    /// Pre-seed usage, e.g. to model an exhausted quota.
    pub async fn set_used(&self, user_id: &str, tool: &str, used: u64) {
        let mut usage = self.usage.lock().await;
        usage
            .entry(user_id.to_string())
            .or_default()
            .insert(tool.to_string(), used);
    }

    pub async fn used(&self, user_id: &str, tool: &str) -> u64 {
        let usage = self.usage.lock().await;
        usage
            .get(user_id)
            .and_then(|tools| tools.get(tool))
            .copied()
            .unwrap_or(0)
    }

    fn limit_for(&self, tool: &str) -> u64 {
        self.limits.get(tool).copied().unwrap_or(self.default_limit)
    }
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    async fn usage_snapshot(&self, user_id: &str) -> Result<Vec<UsageRecord>> {
        let usage = self.usage.lock().await;
        let user = usage.get(user_id);
        Ok(crate::tools::ToolName::ALL
            .into_iter()
            .map(|tool| {
                let name = tool.as_str();
                let used = user.and_then(|u| u.get(name)).copied().unwrap_or(0);
                UsageRecord::new(name, used, self.limit_for(name))
            })
            .collect())
    }

    async fn record_usage(&self, user_id: &str, tool: &str) -> Result<()> {
        let mut usage = self.usage.lock().await;
        *usage
            .entry(user_id.to_string())
            .or_default()
            .entry(tool.to_string())
            .or_insert(0) += 1;
        Ok(())
    }
}
