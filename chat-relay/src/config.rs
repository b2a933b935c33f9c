//! Configuration loading for chat-relay.
//!
//! Configuration is loaded from a TOML file (default: `relay.toml`).

use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration for chat-relay.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Inbound frame dispatch configuration.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// HTTP endpoints configuration.
    #[serde(default)]
    pub http: HttpConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP/WebSocket listener (default: 0.0.0.0:8080).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
    /// Maximum ciphertext size per message in bytes (default: 64KB).
    #[serde(default = "default_max_content_size")]
    pub max_content_size: usize,
}

/// Dispatch configuration.
///
/// Inbound frames go through one bounded queue drained by a fixed pool.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Number of worker tasks handling frames (default: 8).
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Frames that may wait in the queue before readers block (default: 1024).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// HTTP endpoints configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Enable metrics endpoint (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("relay.db")
}

fn default_max_content_size() -> usize {
    64 * 1024 // 64KB
}

fn default_workers() -> usize {
    8
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
            max_content_size: default_max_content_size(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// dispatch pool is configured with zero workers or zero capacity.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "dispatch.workers",
                reason: "must be at least 1".into(),
            });
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "dispatch.queue_capacity",
                reason: "must be at least 1".into(),
            });
        }
        if self.storage.max_content_size == 0 {
            return Err(ConfigError::Invalid {
                field: "storage.max_content_size",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}
