//! Configuration for quota-store

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, StoreError};

/// Longest name accepted by [`NamePolicy::Portable`]
pub const MAX_PORTABLE_NAME_LEN: usize = 100;

/// Store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Capacity granted when the store is created
    #[serde(default)]
    pub initial_capacity: u64,
    /// Most capacity the context may hold at once (unlimited if absent)
    #[serde(default)]
    pub capacity_limit: Option<u64>,
    /// Which file names are accepted
    #[serde(default)]
    pub names: NamePolicy,
    /// Logging configuration (used by the binary)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// File name rules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NamePolicy {
    /// Any string is a valid name
    #[default]
    Any,
    /// 1 to 100 characters from `[A-Za-z0-9_]`
    Portable,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// "pretty" or "compact"
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            capacity_limit: None,
            names: NamePolicy::Any,
            logging: LoggingConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Config(e.to_string()))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: StoreConfig =
            toml::from_str(content).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(limit) = self.capacity_limit {
            if self.initial_capacity > limit {
                return Err(StoreError::Config(format!(
                    "initial_capacity {} exceeds capacity_limit {}",
                    self.initial_capacity, limit
                )));
            }
        }
        Ok(())
    }
}

impl NamePolicy {
    /// Check a file name against the policy
    pub fn check(&self, name: &str) -> Result<()> {
        match self {
            NamePolicy::Any => Ok(()),
            NamePolicy::Portable => {
                let valid = !name.is_empty()
                    && name.len() <= MAX_PORTABLE_NAME_LEN
                    && name
                        .bytes()
                        .all(|b| b.is_ascii_alphanumeric() || b == b'_');
                if valid {
                    Ok(())
                } else {
                    Err(StoreError::InvalidName(name.to_string()))
                }
            }
        }
    }
}
