//! Engine configuration
//!
//! Loaded from TOML; every field has a default so an empty file (or no
//! file) yields a working configuration.

use crate::error::{EngineError, Result};
use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Retry strategy applied by the retry middleware
    pub retry: RetryConfig,

    /// Capacity of the bounded audit queue
    pub audit_queue_capacity: usize,

    /// Token cost assumed for agents that do not estimate their own
    pub default_step_cost: u64,

    /// Age in hours past which non-active checkpoints are swept
    pub checkpoint_retention_hours: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            audit_queue_capacity: 1024,
            default_step_cost: 1_000,
            checkpoint_retention_hours: 24 * 7,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| EngineError::Configuration(e.to_string()))
    }

    /// Load a configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| EngineError::Configuration(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_toml(&text)
    }
}
