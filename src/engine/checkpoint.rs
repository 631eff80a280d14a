//! Checkpoint modes and results
//!
//! A checkpoint copies committed log frames into the page file. It never
//! touches frames of an open transaction.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::replication::ReplicationError;

/// How aggressively a checkpoint runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointMode {
    /// Copy what is committed; never fails because of an open transaction
    #[default]
    Passive,
    /// Like passive, but fails with `Busy` while a transaction is open
    Full,
    /// Like full, then empties the log
    Restart,
    /// Like restart, and reports an empty log
    Truncate,
}

impl CheckpointMode {
    /// Check if the mode refuses to run beside an open transaction.
    pub fn requires_quiescence(&self) -> bool {
        !matches!(self, Self::Passive)
    }

    /// Check if the mode empties the log afterwards.
    pub fn resets_log(&self) -> bool {
        matches!(self, Self::Restart | Self::Truncate)
    }

    /// Lowercase mode name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passive => "passive",
            Self::Full => "full",
            Self::Restart => "restart",
            Self::Truncate => "truncate",
        }
    }
}

impl fmt::Display for CheckpointMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointMode {
    type Err = ReplicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "passive" => Ok(Self::Passive),
            "full" => Ok(Self::Full),
            "restart" => Ok(Self::Restart),
            "truncate" => Ok(Self::Truncate),
            other => Err(ReplicationError::not_found(format!(
                "unknown checkpoint mode: {}",
                other
            ))),
        }
    }
}

/// Outcome of a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CheckpointResult {
    /// Committed frames in the log
    pub frames_in_log: usize,
    /// Of those, frames now in the page file
    pub frames_checkpointed: usize,
}

impl CheckpointResult {
    /// Create a checkpoint result.
    pub fn new(frames_in_log: usize, frames_checkpointed: usize) -> Self {
        Self {
            frames_in_log,
            frames_checkpointed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_names_parse() {
        for mode in [
            CheckpointMode::Passive,
            CheckpointMode::Full,
            CheckpointMode::Restart,
            CheckpointMode::Truncate,
        ] {
            assert_eq!(mode.as_str().parse::<CheckpointMode>().unwrap(), mode);
        }
        assert_eq!("FULL".parse::<CheckpointMode>().unwrap(), CheckpointMode::Full);
        assert!("eager".parse::<CheckpointMode>().is_err());
    }

    #[test]
    fn test_mode_properties() {
        assert!(!CheckpointMode::Passive.requires_quiescence());
        assert!(CheckpointMode::Full.requires_quiescence());
        assert!(!CheckpointMode::Full.resets_log());
        assert!(CheckpointMode::Restart.resets_log());
        assert!(CheckpointMode::Truncate.resets_log());
    }

    #[test]
    fn test_mode_serde_lowercase() {
        let json = serde_json::to_string(&CheckpointMode::Truncate).unwrap();
        assert_eq!(json, "\"truncate\"");
        let mode: CheckpointMode = serde_json::from_str("\"restart\"").unwrap();
        assert_eq!(mode, CheckpointMode::Restart);
    }
}
