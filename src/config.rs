//! Relay configuration
//!
//! Every section has serde defaults so a partial JSON file or a handful of
//! environment variables is enough to start the relay. `validate()` must be
//! called before the configuration is used.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

use crate::error::{RelayError, Result};
use crate::tools::{ToolCategory, ToolName};

const ENV_PREFIX: &str = "TOOLSTREAM_";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub upstream: UpstreamConfig,
    pub tools: ToolServiceConfig,
    pub quota: QuotaConfig,
    pub assets: AssetStoreConfig,
    pub server: ServerConfig,
    pub orchestrator: OrchestratorConfig,
}

/// Upstream chat-completion provider.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    #[serde(deserialize_with = "deserialize_secret")]
    pub api_key: SecretString,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: SecretString::from(String::new()),
            model: "gpt-4o-mini".to_string(),
            temperature: None,
            max_tokens: None,
            top_p: None,
            connect_timeout_secs: 10,
        }
    }
}

impl UpstreamConfig {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: SecretString::from(api_key.to_string()),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Tool microservices.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolServiceConfig {
    /// Base URL; a tool without an explicit endpoint is served at `{base_url}/{toolName}`.
    pub base_url: String,
    /// Per-tool endpoint overrides keyed by wire name (e.g. `searchWeb`).
    pub endpoints: HashMap<String, String>,
    pub timeouts: ToolTimeouts,
}

impl Default for ToolServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8090".to_string(),
            endpoints: HashMap::new(),
            timeouts: ToolTimeouts::default(),
        }
    }
}

impl ToolServiceConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }

    pub fn with_endpoint(mut self, tool: ToolName, url: &str) -> Self {
        self.endpoints.insert(tool.as_str().to_string(), url.to_string());
        self
    }

    pub fn with_timeouts(mut self, timeouts: ToolTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn endpoint_for(&self, tool: ToolName) -> String {
        self.endpoints
            .get(tool.as_str())
            .cloned()
            .unwrap_or_else(|| format!("{}/{}", self.base_url.trim_end_matches('/'), tool.as_str()))
    }
}

/// Execution deadline per tool category, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ToolTimeouts {
    pub media_secs: u64,
    pub web_search_secs: u64,
    pub encyclopedia_secs: u64,
    pub financial_secs: u64,
    pub default_secs: u64,
}

impl Default for ToolTimeouts {
    fn default() -> Self {
        Self {
            media_secs: 30,
            web_search_secs: 45,
            encyclopedia_secs: 15,
            financial_secs: 15,
            default_secs: 10,
        }
    }
}

impl ToolTimeouts {
    /// Same deadline for every category.
    pub fn uniform(secs: u64) -> Self {
        Self {
            media_secs: secs,
            web_search_secs: secs,
            encyclopedia_secs: secs,
            financial_secs: secs,
            default_secs: secs,
        }
    }

    pub fn for_category(&self, category: ToolCategory) -> Duration {
        let secs = match category {
            ToolCategory::Media => self.media_secs,
            ToolCategory::WebSearch => self.web_search_secs,
            ToolCategory::Encyclopedia => self.encyclopedia_secs,
            ToolCategory::Financial => self.financial_secs,
            ToolCategory::General => self.default_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Identity/quota collaborator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Identity service URL. `None` keeps usage in process memory.
    pub identity_base_url: Option<String>,
    /// Multiplier applied to every per-tool limit.
    pub window_scaling_factor: f64,
    /// Per-tool limit used by the in-memory store.
    pub default_limit: u64,
    /// Deadline for each identity service call.
    pub timeout_secs: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            identity_base_url: None,
            window_scaling_factor: 1.0,
            default_limit: 50,
            timeout_secs: 5,
        }
    }
}

impl QuotaConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Durable asset storage.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AssetStoreConfig {
    /// Asset service URL. `None` keeps upstream URLs as they are.
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Upper bound on upstream rounds per session (first round included).
    pub max_rounds: usize,
    pub tools_enabled: bool,
    /// Appended to the final text when the round limit forces a stop.
    pub truncation_note: String,
    /// Buffered wire frames per session before the writer waits.
    pub channel_capacity: usize,
    /// Send a generic message in `error` frames instead of upstream details.
    pub mask_errors: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_rounds: 8,
            tools_enabled: true,
            truncation_note: "[Stopped: tool round limit reached]".to_string(),
            channel_capacity: 64,
            mask_errors: false,
        }
    }
}

impl RelayConfig {
    /// Load from a JSON file. Missing sections fall back to defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RelayError::ConfigurationError(format!(
                "Failed to read {}: {e}",
                path.as_ref().display()
            ))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| RelayError::ConfigurationError(format!("Invalid config file: {e}")))
    }

    /// Load from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Load from `TOOLSTREAM_*` key/value pairs.
    ///
    /// `OPENAI_API_KEY` is honored when `TOOLSTREAM_UPSTREAM_API_KEY` is absent.
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars.into_iter().collect();
        let get = |key: &str| vars.get(&format!("{ENV_PREFIX}{key}")).cloned();
        let mut config = Self::default();

        if let Some(url) = get("UPSTREAM_BASE_URL") {
            config.upstream.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(key) = get("UPSTREAM_API_KEY").or_else(|| vars.get("OPENAI_API_KEY").cloned()) {
            config.upstream.api_key = SecretString::from(key);
        }
        if let Some(model) = get("MODEL") {
            config.upstream.model = model;
        }
        config.upstream.temperature = parse_var(&vars, "TEMPERATURE")?.or(config.upstream.temperature);
        config.upstream.max_tokens = parse_var(&vars, "MAX_TOKENS")?.or(config.upstream.max_tokens);

        if let Some(url) = get("TOOLS_BASE_URL") {
            config.tools.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = parse_var(&vars, "TOOL_TIMEOUT_SECS")? {
            config.tools.timeouts = ToolTimeouts::uniform(secs);
        }

        config.quota.identity_base_url = get("IDENTITY_URL").or(config.quota.identity_base_url);
        if let Some(scale) = parse_var(&vars, "QUOTA_SCALE")? {
            config.quota.window_scaling_factor = scale;
        }
        if let Some(limit) = parse_var(&vars, "QUOTA_DEFAULT_LIMIT")? {
            config.quota.default_limit = limit;
        }
        if let Some(secs) = parse_var(&vars, "QUOTA_TIMEOUT_SECS")? {
            config.quota.timeout_secs = secs;
        }

        config.assets.base_url = get("ASSET_STORE_URL").or(config.assets.base_url);

        if let Some(addr) = get("BIND_ADDR") {
            config.server.bind_addr = addr;
        }

        if let Some(rounds) = parse_var(&vars, "MAX_ROUNDS")? {
            config.orchestrator.max_rounds = rounds;
        }
        if let Some(enabled) = parse_var(&vars, "TOOLS_ENABLED")? {
            config.orchestrator.tools_enabled = enabled;
        }
        if let Some(mask) = parse_var(&vars, "MASK_ERRORS")? {
            config.orchestrator.mask_errors = mask;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_url("upstream.base_url", &self.upstream.base_url)?;
        if self.upstream.api_key.expose_secret().is_empty() {
            return Err(RelayError::ConfigurationError(
                "Upstream API key cannot be empty".to_string(),
            ));
        }
        if self.upstream.model.is_empty() {
            return Err(RelayError::ConfigurationError(
                "Upstream model cannot be empty".to_string(),
            ));
        }
        validate_url("tools.base_url", &self.tools.base_url)?;
        for (tool, url) in &self.tools.endpoints {
            if ToolName::from_str(tool).is_err() {
                return Err(RelayError::ConfigurationError(format!(
                    "Endpoint configured for unknown tool: {tool}"
                )));
            }
            validate_url(&format!("tools.endpoints.{tool}"), url)?;
        }
        let t = &self.tools.timeouts;
        if [t.media_secs, t.web_search_secs, t.encyclopedia_secs, t.financial_secs, t.default_secs]
            .contains(&0)
        {
            return Err(RelayError::ConfigurationError(
                "Tool timeouts must be positive".to_string(),
            ));
        }
        if let Some(url) = &self.quota.identity_base_url {
            validate_url("quota.identity_base_url", url)?;
        }
        if !(self.quota.window_scaling_factor > 0.0) {
            return Err(RelayError::ConfigurationError(
                "Quota window scaling factor must be positive".to_string(),
            ));
        }
        if self.quota.timeout_secs == 0 {
            return Err(RelayError::ConfigurationError(
                "Quota timeout must be positive".to_string(),
            ));
        }
        if let Some(url) = &self.assets.base_url {
            validate_url("assets.base_url", url)?;
        }
        if self.orchestrator.max_rounds == 0 {
            return Err(RelayError::ConfigurationError(
                "max_rounds must be at least 1".to_string(),
            ));
        }
        if self.orchestrator.channel_capacity == 0 {
            return Err(RelayError::ConfigurationError(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_url(field: &str, url: &str) -> Result<()> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(RelayError::ConfigurationError(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

fn parse_var<T>(vars: &HashMap<String, String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let name = format!("{ENV_PREFIX}{key}");
    match vars.get(&name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            RelayError::ConfigurationError(format!("Invalid value for {name}: {e}"))
        }),
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(SecretString::from(raw))
}
