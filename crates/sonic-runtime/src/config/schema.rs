//! Configuration schema definitions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sonic_core::{CategoryInfo, ExtensionDeclaration, ReplacePolicy};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Engine-wide settings.
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Logging of the orchestrator itself.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Status endpoint.
    #[serde(default)]
    pub status: StatusConfig,

    /// Message broker shared with the extensions.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Known extension categories.
    #[serde(default)]
    pub categories: Vec<CategoryInfo>,

    /// Extension declarations.
    #[serde(default)]
    pub extensions: Vec<ExtensionDeclaration>,
}

// =============================================================================
// Metadata
// =============================================================================

/// Engine-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Root of the managed extension tree.
    #[serde(default = "default_extensions_folder")]
    pub extensions_folder: PathBuf,

    /// What to do with already existing instance directories.
    #[serde(default)]
    pub replace_existing: ReplacePolicy,

    /// Supervision poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            extensions_folder: default_extensions_folder(),
            replace_existing: ReplacePolicy::default(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl MetadataConfig {
    /// Returns the poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_extensions_folder() -> PathBuf {
    PathBuf::from("./extensions")
}

fn default_poll_interval_ms() -> u64 {
    1000
}

// =============================================================================
// Status
// =============================================================================

/// Status endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Whether to serve the status endpoint.
    #[serde(default)]
    pub enabled: bool,

    /// Address to bind to.
    #[serde(default = "default_status_addr")]
    pub addr: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_status_addr(),
        }
    }
}

fn default_status_addr() -> String {
    "127.0.0.1:8011".to_string()
}

// =============================================================================
// Broker
// =============================================================================

/// Which broker implementation to connect to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerBackend {
    /// Redis server at [`BrokerConfig::url`].
    #[default]
    Redis,
    /// In-process broker; only reachable from inside the orchestrator.
    Memory,
}

/// Message broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub backend: BrokerBackend,

    /// Connection URL, also handed to extensions.
    #[serde(default = "default_broker_url")]
    pub url: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            backend: BrokerBackend::default(),
            url: default_broker_url(),
        }
    }
}

fn default_broker_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

// =============================================================================
// Logging
// =============================================================================

/// Log level for the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
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
    /// Returns the level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Rotation period for file output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events to log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
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

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level. `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file, used when `output` is `file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    /// Rotation period of the log file.
    #[serde(default)]
    pub rotation: LogRotation,

    /// Rotated files to keep.
    #[serde(default = "default_max_files")]
    pub max_files: u32,

    /// Per-module levels, e.g. `sonic_host: debug`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line in log lines.
    #[serde(default)]
    pub file_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file_path: None,
            rotation: LogRotation::default(),
            max_files: default_max_files(),
            filters: HashMap::new(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
        }
    }
}

fn default_max_files() -> u32 {
    5
}
