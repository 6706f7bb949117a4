//! Configuration management for session-engine.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::Args;
use crate::engine::EngineConfig;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine lifecycle settings.
    pub engine: EngineSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Engine configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Milliseconds between shutdown-state polls.
    pub poll_interval_ms: u64,
    /// Seconds between heartbeats.
    pub heartbeat_interval_secs: u64,
    /// Install SIGINT/SIGTERM handlers.
    pub install_signal_handlers: bool,
    /// Broadcast capacity of each session's conversation.
    pub message_buffer: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            heartbeat_interval_secs: 3,
            install_signal_handlers: true,
            message_buffer: 256,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a full filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    ///
    /// Unparseable numeric values are ignored.
    pub fn apply_env(&mut self) {
        if let Ok(ms) = std::env::var("SESSION_ENGINE_POLL_INTERVAL_MS") {
            if let Ok(ms) = ms.parse() {
                self.engine.poll_interval_ms = ms;
            }
        }

        if let Ok(secs) = std::env::var("SESSION_ENGINE_HEARTBEAT_SECS") {
            if let Ok(secs) = secs.parse() {
                self.engine.heartbeat_interval_secs = secs;
            }
        }

        if let Ok(level) = std::env::var("SESSION_ENGINE_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ms) = args.poll_interval_ms {
            self.engine.poll_interval_ms = ms;
        }

        if let Some(secs) = args.heartbeat_secs {
            self.engine.heartbeat_interval_secs = secs;
        }

        if args.no_signals {
            self.engine.install_signal_handlers = false;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(ref path) = args.config {
            config = Config::from_file(path)?;
        }

        config.apply_env();
        config.apply_args(args);

        Ok(config)
    }

    /// Convert to the runtime [`EngineConfig`].
    pub fn to_engine_config(&self) -> Result<EngineConfig, ConfigError> {
        if self.engine.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue("poll_interval_ms", "0".into()));
        }
        if self.engine.heartbeat_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "heartbeat_interval_secs",
                "0".into(),
            ));
        }
        if self.engine.message_buffer == 0 {
            return Err(ConfigError::InvalidValue("message_buffer", "0".into()));
        }

        Ok(EngineConfig {
            poll_interval: Duration::from_millis(self.engine.poll_interval_ms),
            heartbeat_interval: Duration::from_secs(self.engine.heartbeat_interval_secs),
            message_buffer: self.engine.message_buffer,
        })
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// A setting has a value the engine cannot run with.
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for {}: '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::InvalidValue(..) => None,
        }
    }
}
