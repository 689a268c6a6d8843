//! Tracing subscriber setup
//!
//! ```rust,ignore
//! use toolstream::telemetry::{init_subscriber, OutputFormat, SubscriberConfig};
//!
//! let config = SubscriberConfig::builder()
//!     .log_level(tracing::Level::DEBUG)
//!     .output_format(OutputFormat::Json)
//!     .build();
//! let _guard = init_subscriber(config)?;
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::error::{RelayError, Result};

/// Output format for tracing logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    Json,
    JsonCompact,
}

impl std::str::FromStr for OutputFormat {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "json-compact" => Ok(Self::JsonCompact),
            other => Err(RelayError::ConfigurationError(format!(
                "Invalid log format: {other}. Valid options: text, json, json-compact"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriberConfig {
    pub log_level: tracing::Level,
    pub output_format: OutputFormat,
    /// Write to this file (non-blocking) instead of stdout.
    pub log_file: Option<PathBuf>,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            log_level: tracing::Level::INFO,
            output_format: OutputFormat::Text,
            log_file: None,
        }
    }
}

impl SubscriberConfig {
    pub fn builder() -> SubscriberConfigBuilder {
        SubscriberConfigBuilder::default()
    }

    /// Build from `TOOLSTREAM_LOG_LEVEL`, `TOOLSTREAM_LOG_FORMAT` and `TOOLSTREAM_LOG_FILE`.
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars.into_iter().collect();
        let mut builder = Self::builder();
        if let Some(level) = vars.get("TOOLSTREAM_LOG_LEVEL") {
            builder = builder.log_level_str(level)?;
        }
        if let Some(format) = vars.get("TOOLSTREAM_LOG_FORMAT") {
            builder = builder.output_format(format.parse()?);
        }
        if let Some(path) = vars.get("TOOLSTREAM_LOG_FILE") {
            builder = builder.log_file(PathBuf::from(path));
        }
        Ok(builder.build())
    }
}

/// Builder for SubscriberConfig
#[derive(Debug, Default)]
pub struct SubscriberConfigBuilder {
    log_level: Option<tracing::Level>,
    output_format: Option<OutputFormat>,
    log_file: Option<PathBuf>,
}

impl SubscriberConfigBuilder {
    pub fn log_level(mut self, level: tracing::Level) -> Self {
        self.log_level = Some(level);
        self
    }

    pub fn log_level_str(mut self, level: &str) -> Result<Self> {
        let level = match level.to_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "info" => tracing::Level::INFO,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => {
                return Err(RelayError::ConfigurationError(format!(
                    "Invalid log level: {level}. Valid options: trace, debug, info, warn, error"
                )));
            }
        };
        self.log_level = Some(level);
        Ok(self)
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn log_file(mut self, path: PathBuf) -> Self {
        self.log_file = Some(path);
        self
    }

    pub fn build(self) -> SubscriberConfig {
        SubscriberConfig {
            log_level: self.log_level.unwrap_or(tracing::Level::INFO),
            output_format: self.output_format.unwrap_or_default(),
            log_file: self.log_file,
        }
    }
}

fn level_str(level: tracing::Level) -> &'static str {
    match level {
        tracing::Level::TRACE => "trace",
        tracing::Level::DEBUG => "debug",
        tracing::Level::INFO => "info",
        tracing::Level::WARN => "warn",
        tracing::Level::ERROR => "error",
    }
}

/// Initialize the global subscriber.
///
/// `RUST_LOG`, when set, overrides the configured level. Returns the file
/// writer's guard when `log_file` is set; keep it alive for the life of the
/// process. A subscriber that is already installed is left in place and
/// `Ok(None)` is returned.
pub fn init_subscriber(config: SubscriberConfig) -> Result<Option<WorkerGuard>> {
    let level = level_str(config.log_level);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("toolstream={level}")));

    let (writer, guard) = match &config.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let file_name = path.file_name().ok_or_else(|| {
                RelayError::ConfigurationError(format!("Invalid log file path: {}", path.display()))
            })?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stdout), None),
    };
    let ansi = config.log_file.is_none();

    let init_result = match config.output_format {
        OutputFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .json()
            .try_init(),
        OutputFormat::JsonCompact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_target(true)
            .json()
            .flatten_event(true)
            .try_init(),
        OutputFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .try_init(),
    };

    match init_result {
        Ok(()) => Ok(guard),
        Err(e) => {
            if e.to_string()
                .contains("global default trace dispatcher has already been set")
            {
                Ok(None)
            } else {
                Err(RelayError::ConfigurationError(format!(
                    "Failed to initialize tracing: {e}"
                )))
            }
        }
    }
}

/// Initialize from `TOOLSTREAM_LOG_*` environment variables.
pub fn init_from_env() -> Result<Option<WorkerGuard>> {
    init_subscriber(SubscriberConfig::from_vars(std::env::vars())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn config_from_vars() {
        let config = SubscriberConfig::from_vars(vars(&[
            ("TOOLSTREAM_LOG_LEVEL", "DEBUG"),
            ("TOOLSTREAM_LOG_FORMAT", "json-compact"),
            ("TOOLSTREAM_LOG_FILE", "/tmp/toolstream.log"),
        ]))
        .unwrap();
        assert_eq!(config.log_level, tracing::Level::DEBUG);
        assert_eq!(config.output_format, OutputFormat::JsonCompact);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/toolstream.log")));

        assert_eq!(SubscriberConfig::from_vars(vars(&[])).unwrap(), SubscriberConfig::default());
    }

    #[test]
    fn rejects_unknown_level_and_format() {
        assert!(SubscriberConfig::from_vars(vars(&[("TOOLSTREAM_LOG_LEVEL", "loud")])).is_err());
        assert!(SubscriberConfig::from_vars(vars(&[("TOOLSTREAM_LOG_FORMAT", "xml")])).is_err());
    }
}
