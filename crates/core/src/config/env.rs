//! Environment variable overrides for Auton configuration

use std::env;
use std::str::FromStr;
use tracing::warn;

use super::EngineConfig;

/// Environment variable prefix for Auton configuration
pub const ENV_PREFIX: &str = "AUTON_";

/// Applies `<prefix>KEY` environment variables on top of a base configuration
#[derive(Debug, Clone)]
pub struct EnvOverrides {
    prefix: String,
}

impl Default for EnvOverrides {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvOverrides {
    /// Overrides using the standard `AUTON_` prefix
    pub fn new() -> Self {
        Self::with_prefix(ENV_PREFIX)
    }

    /// Overrides using a custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// Parse an environment variable, falling back to `default`
    pub fn parse_env<T: FromStr>(&self, key: &str, default: T) -> T
    where
        T::Err: std::fmt::Display,
    {
        let env_key = format!("{}{}", self.prefix, key);
        match env::var(&env_key) {
            Ok(value) => match value.parse::<T>() {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("Failed to parse env variable {}: {}", env_key, e);
                    default
                }
            },
            Err(_) => default,
        }
    }

    /// Parse a boolean environment variable
    pub fn parse_bool_env(&self, key: &str, default: bool) -> bool {
        let env_key = format!("{}{}", self.prefix, key);
        match env::var(&env_key) {
            Ok(value) => match value.to_lowercase().as_str() {
                "true" | "1" | "yes" | "y" | "on" => true,
                "false" | "0" | "no" | "n" | "off" => false,
                _ => {
                    warn!("Failed to parse boolean env variable {}", env_key);
                    default
                }
            },
            Err(_) => default,
        }
    }

    /// Apply the overrides to `base`
    pub fn apply(&self, base: EngineConfig) -> EngineConfig {
        let mut config = base;
        config.log_level = self.parse_env("LOG_LEVEL", config.log_level.clone());
        config.events.enabled = self.parse_bool_env("EVENTS_ENABLED", config.events.enabled);
        config.events.capacity = self.parse_env("EVENT_CAPACITY", config.events.capacity);
        config
    }
}
