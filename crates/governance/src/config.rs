//! Governance configuration

use std::path::Path;
use serde::{Deserialize, Serialize};

use auton_core::config::{load_toml, parse_toml};
use auton_core::{ConfigError, EngineConfig};

use crate::model::ProvisionParams;
use crate::GovernanceResult;

/// Section name under `[custom]` in the engine configuration
pub const CONFIG_SECTION: &str = "governance";

/// Configuration for the governance engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Topic of the best-effort decision notification
    pub decided_topic: String,
    /// Invitation window for members added by proposal, in minutes
    pub invitation_window: u64,
    /// Provision every proposal type starts with in a newly created scope
    pub founding_provision: ProvisionParams,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            decided_topic: "proposal:decided".to_string(),
            invitation_window: 60 * 24 * 7, // one week
            founding_provision: ProvisionParams::default(),
        }
    }
}

impl GovernanceConfig {
    /// Parse from TOML text
    pub fn from_toml_str(content: &str) -> GovernanceResult<Self> {
        let config: Self = parse_toml(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub async fn load<P: AsRef<Path>>(path: P) -> GovernanceResult<Self> {
        let config: Self = load_toml(path).await?;
        config.validate()?;
        Ok(config)
    }

    /// Read the `[custom.governance]` section, defaulting when absent
    pub fn from_engine(engine: &EngineConfig) -> GovernanceResult<Self> {
        if !engine.custom.contains_key(CONFIG_SECTION) {
            return Ok(Self::default());
        }
        let config: Self = engine.get_custom(CONFIG_SECTION)?;
        config.validate()?;
        Ok(config)
    }

    /// Store this configuration as the `[custom.governance]` section
    pub fn install(&self, engine: &mut EngineConfig) -> GovernanceResult<()> {
        let value = toml::Value::try_from(self).map_err(|e| {
            ConfigError::InvalidValue(CONFIG_SECTION.to_string(), e.to_string())
        })?;
        engine.custom.insert(CONFIG_SECTION.to_string(), value);
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> GovernanceResult<()> {
        self.founding_provision.validate()
    }
}
