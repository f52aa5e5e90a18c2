//! Configuration for Climate View.

use crate::coordinator::CoordinatorConfig;
use crate::core::reading::{FieldSet, WindowWidth, DEFAULT_HALF_WINDOW};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Ceiling for any configured half-window.
pub const HALF_WINDOW_LIMIT: usize = 1_000_000;

/// Main configuration for the engine and its front-ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Reading log (JSON Lines) written by the ingest process
    pub store_path: PathBuf,

    /// How often every view is refreshed
    #[serde(with = "duration_serde")]
    pub refresh_interval: Duration,

    /// Half-window used before the user picks one
    pub default_half_window: usize,

    /// Largest half-window a user may request
    pub max_half_window: Option<usize>,

    /// Fields covered by the stats table
    pub fields: FieldSet,

    /// Address the HTTP API binds to
    pub server_host: String,

    /// Port the HTTP API binds to
    pub server_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("climate-view");

        Self {
            store_path: data_dir.join("readings.jsonl"),
            refresh_interval: Duration::from_secs(30),
            default_half_window: DEFAULT_HALF_WINDOW,
            max_half_window: Some(100),
            fields: FieldSet::all(),
            server_host: "127.0.0.1".to_string(),
            server_port: 8080,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file, falling back to defaults if absent.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a specific file, creating its directory.
    pub fn save_to(&self, config_path: &std::path::Path) -> Result<(), ConfigError> {
        self.validate()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("climate-view")
            .join("config.json")
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "refresh_interval must be at least one second".to_string(),
            ));
        }
        for (name, value) in [
            ("default_half_window", Some(self.default_half_window)),
            ("max_half_window", self.max_half_window),
        ] {
            if let Some(value) = value.filter(|&v| v > HALF_WINDOW_LIMIT) {
                return Err(ConfigError::Invalid(format!(
                    "{name} {value} exceeds the limit of {HALF_WINDOW_LIMIT}"
                )));
            }
        }
        if let Some(max) = self.max_half_window {
            if self.default_half_window > max {
                return Err(ConfigError::Invalid(format!(
                    "default_half_window {} exceeds max_half_window {max}",
                    self.default_half_window
                )));
            }
        }
        if !self.fields.any_selected() {
            return Err(ConfigError::Invalid(
                "at least one stats field must be enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Coordinator settings derived from this configuration.
    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            initial_half_window: WindowWidth::from(self.default_half_window),
            max_half_window: self.max_half_window,
            fields: self.fields,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as whole seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
