// SPDX-License-Identifier: MIT OR Apache-2.0
//! Engine configuration, stored as RON.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current configuration format version
pub const CONFIG_FORMAT_VERSION: u32 = 1;

/// Default cap on flow steps per pass
pub const DEFAULT_MAX_FLOW_STEPS: usize = 1000;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid RON for this format
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Configuration could not be serialized
    #[error("Serialization error: {0}")]
    Serialize(#[from] ron::Error),

    /// File was written by a newer version
    #[error("Config version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Highest supported version
        supported: u32,
    },

    /// A setting is out of range
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Evaluator limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Flow steps after which a pass fails with an infinite loop
    pub max_flow_steps: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            max_flow_steps: DEFAULT_MAX_FLOW_STEPS,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Format version
    pub version: u32,
    /// Evaluator limits
    pub evaluator: EvaluatorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_FORMAT_VERSION,
            evaluator: EvaluatorConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from RON text
    pub fn from_ron(s: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = ron::from_str(s)?;

        if config.version > CONFIG_FORMAT_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: config.version,
                supported: CONFIG_FORMAT_VERSION,
            });
        }
        if config.evaluator.max_flow_steps == 0 {
            return Err(ConfigError::Invalid("max_flow_steps must be at least 1".to_string()));
        }

        Ok(config)
    }

    /// Serialize to RON text
    pub fn to_ron(&self) -> Result<String, ConfigError> {
        let config = ron::ser::PrettyConfig::default().struct_names(true);
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_ron(&content)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }
}
