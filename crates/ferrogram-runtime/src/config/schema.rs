//! Configuration schema definitions.
//!
//! Sections that configure a single component reuse that component's own
//! config type, so a file section maps one to one onto what the component
//! receives.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ferrogram_framework::DispatcherConfig;
use ferrogram_transport::{HttpApiConfig, PollingConfig, WebhookConfig};

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FerrogramConfig {
    /// Bot API connection settings.
    #[serde(default)]
    pub bot: HttpApiConfig,

    /// Acquisition strategy used by `BotRuntime::run`.
    #[serde(default)]
    pub mode: Mode,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub webhook: WebhookConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How updates are acquired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Long polling with `getUpdates`.
    #[default]
    Polling,
    /// A webhook listener.
    Webhook,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Polling => f.write_str("polling"),
            Self::Webhook => f.write_str("webhook"),
        }
    }
}

/// Lifecycle settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// How long shutdown waits for the producer and the dispatch loop, in
    /// milliseconds. Must cover `dispatcher.drain_timeout_secs`.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_shutdown_grace_ms() -> u64 {
    5000
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl RuntimeConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line format of log output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Newline delimited JSON. Needs the `json-log` feature.
    Json,
}

/// Where log output goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// The file at `file_path`.
    File,
}

/// When a log file is rotated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level; `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file, used when `output` is `file`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Per-module levels, e.g. `ferrogram_transport = "debug"`.
    #[serde(default)]
    pub filters: BTreeMap<String, LogLevel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = FerrogramConfig::default();
        assert_eq!(config.mode, Mode::Polling);
        assert_eq!(config.bot.api_url, "https://api.telegram.org");
        assert_eq!(config.polling.timeout_secs, 3600);
        assert_eq!(config.webhook.max_body_size, 1 << 20);
        assert_eq!(config.dispatcher.queue_capacity, 20);
        assert_eq!(config.runtime.shutdown_grace(), Duration::from_secs(5));
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn enums_use_lowercase_names() {
        let mode: Mode = serde_json::from_str("\"webhook\"").unwrap();
        assert_eq!(mode, Mode::Webhook);
        let format: LogFormat = serde_json::from_str("\"pretty\"").unwrap();
        assert_eq!(format, LogFormat::Pretty);
        assert!(serde_json::from_str::<LogLevel>("\"loud\"").is_err());
    }
}
