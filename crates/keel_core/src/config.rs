//! Scene configuration
//!
//! Loaded once at startup, typically from a JSON file next to the binary.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

/// Tuning knobs for an [`EcsScene`](crate::ecs::EcsScene).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Rows allocated when an entity set is first created.
    pub initial_set_capacity: usize,
    /// Hard ceiling on rows per entity set; growth past it is an error.
    pub max_set_capacity: usize,
    /// Spare arrays the pool keeps per capacity bucket.
    pub pool_retain_per_bucket: usize,
}

impl SceneConfig {
    pub const DEFAULT_INITIAL_SET_CAPACITY: usize = 16;
    pub const DEFAULT_MAX_SET_CAPACITY: usize = 1 << 24;
    pub const DEFAULT_POOL_RETAIN_PER_BUCKET: usize = 8;

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SceneConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_set_capacity == 0 {
            return Err(ConfigError::Invalid {
                reason: "initial_set_capacity must be at least 1".to_string(),
            });
        }
        if self.initial_set_capacity > self.max_set_capacity {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "initial_set_capacity {} exceeds max_set_capacity {}",
                    self.initial_set_capacity, self.max_set_capacity
                ),
            });
        }
        Ok(())
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            initial_set_capacity: Self::DEFAULT_INITIAL_SET_CAPACITY,
            max_set_capacity: Self::DEFAULT_MAX_SET_CAPACITY,
            pool_retain_per_bucket: Self::DEFAULT_POOL_RETAIN_PER_BUCKET,
        }
    }
}
