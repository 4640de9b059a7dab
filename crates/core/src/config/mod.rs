//! Configuration for Auton
//!
//! Engine settings are read from a TOML file and can be overridden through
//! `AUTON_`-prefixed environment variables (see [`env`]). Component crates
//! keep their own sections under `[custom.<name>]`.

use std::collections::BTreeMap;
use std::path::Path;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

/// Error types for configuration operations
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Parsing error
    #[error("Parsing error: {0}")]
    ParseError(String),

    /// Key not found
    #[error("Configuration key not found: {0}")]
    KeyNotFound(String),

    /// Value error
    #[error("Invalid value for key {0}: {1}")]
    InvalidValue(String, String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Read and parse a TOML file
pub async fn load_toml<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> ConfigResult<T> {
    let content = fs::read_to_string(path).await?;
    parse_toml(&content)
}

/// Parse a TOML document
pub fn parse_toml<T: DeserializeOwned>(content: &str) -> ConfigResult<T> {
    toml::from_str(content)
        .map_err(|e| ConfigError::ParseError(format!("Failed to parse config: {}", e)))
}

/// Event channel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Whether notifications are published at all
    pub enabled: bool,
    /// Per-subscriber buffer of the broadcast channel
    pub capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 256,
        }
    }
}

/// Main configuration for an engine host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log level used when `RUST_LOG` is unset
    pub log_level: String,
    /// Event channel configuration
    pub events: EventConfig,
    /// Component sections
    pub custom: BTreeMap<String, toml::Value>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            events: EventConfig::default(),
            custom: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        load_toml(path).await
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        parse_toml(content)
    }

    /// Serialize configuration back to TOML
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(format!("Failed to serialize config: {}", e)))
    }

    /// Deserialize the `[custom.<key>]` section
    pub fn get_custom<T: DeserializeOwned>(&self, key: &str) -> ConfigResult<T> {
        let value = self.custom.get(key)
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;

        value.clone().try_into()
            .map_err(|e| ConfigError::InvalidValue(
                key.to_string(),
                format!("Failed to deserialize value: {}", e),
            ))
    }

    /// Install the global subscriber at `log_level` unless `RUST_LOG` says otherwise
    pub fn init_tracing(&self) -> anyhow::Result<()> {
        crate::init_tracing(&self.log_level)
    }
}

pub mod env;

pub use env::EnvOverrides;
