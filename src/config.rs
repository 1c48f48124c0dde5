//! Coordinator configuration.

use serde::{Deserialize, Serialize};

use crate::transaction::{IsolationLevel, TransactionResult};

/// Coordinator configuration options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Isolation level used by `run` when the caller does not pick one.
    pub default_isolation: IsolationLevel,
    /// Keep a registry of started, unfinished transactions.
    pub track_active: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_isolation: IsolationLevel::ReadCommitted,
            track_active: true,
        }
    }
}

impl CoordinatorConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> TransactionResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the default isolation level.
    pub fn default_isolation(mut self, value: IsolationLevel) -> Self {
        self.default_isolation = value;
        self
    }

    /// Set track_active flag.
    pub fn track_active(mut self, value: bool) -> Self {
        self.track_active = value;
        self
    }
}
