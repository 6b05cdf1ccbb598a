//! Engine configuration.

use crate::error::{Error, Result};
use cascade_quorum::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};

/// Default bound on nested calls (deliveries, governance calls, child seeding).
pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Leaderboard slots per instance
    pub capacity: usize,

    /// Maximum nesting of calls within one top-level operation
    pub max_call_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables with defaults.
    ///
    /// Reads `CASCADE_CAPACITY` and `CASCADE_MAX_CALL_DEPTH`.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            capacity: env_usize("CASCADE_CAPACITY")?.unwrap_or(defaults.capacity),
            max_call_depth: env_usize("CASCADE_MAX_CALL_DEPTH")?.unwrap_or(defaults.max_call_depth),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine can't run with.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::Config("capacity must be at least 1".into()));
        }
        if self.max_call_depth == 0 {
            return Err(Error::Config("max_call_depth must be at least 1".into()));
        }
        Ok(())
    }
}

fn env_usize(key: &str) -> Result<Option<usize>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid {}: {}", key, e))),
        Err(_) => Ok(None),
    }
}
