//! Engine Configuration
//!
//! Configured once when a connection opens and immutable afterwards.
//! Loadable from JSON; missing keys take their defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::replication::{ErrorCode, ReplicationError, ReplicationResult};

/// Smallest supported page size in bytes.
pub const MIN_PAGE_SIZE: usize = 512;
/// Largest supported page size in bytes.
pub const MAX_PAGE_SIZE: usize = 65536;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Page size in bytes, a power of two in 512..=65536.
    pub page_size: usize,

    /// Run a passive checkpoint after a commit once the log holds at least
    /// this many committed frames. 0 disables automatic checkpoints.
    pub wal_autocheckpoint: u32,

    /// Schema attached when the connection opens.
    pub default_schema: String,
}

impl EngineConfig {
    /// Parse a configuration from JSON.
    pub fn from_json_str(json: &str) -> ReplicationResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            ReplicationError::new(ErrorCode::Error, format!("invalid engine config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> ReplicationResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            ReplicationError::new(
                ErrorCode::Error,
                format!("cannot read engine config {}: {}", path.display(), e),
            )
        })?;
        Self::from_json_str(&json)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ReplicationResult<()> {
        if !self.page_size.is_power_of_two()
            || !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size)
        {
            return Err(ReplicationError::contract_violation(format!(
                "page_size must be a power of two between {} and {}, got {}",
                MIN_PAGE_SIZE, MAX_PAGE_SIZE, self.page_size
            )));
        }

        if self.default_schema.is_empty() {
            return Err(ReplicationError::contract_violation(
                "default_schema must not be empty",
            ));
        }

        Ok(())
    }

    /// Same configuration with a different page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Same configuration with a different autocheckpoint threshold.
    pub fn with_autocheckpoint(mut self, frames: u32) -> Self {
        self.wal_autocheckpoint = frames;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: 4096,
            wal_autocheckpoint: 1000,
            default_schema: "main".to_string(),
        }
    }
}
