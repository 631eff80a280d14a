//! CLI-specific error types
//!
//! A CLI error ends the process. Failures of individual shell requests are
//! not CLI errors; they are reported on stdout and the shell goes on.

use std::io;

use thiserror::Error;

use crate::replication::ReplicationError;

/// CLI error
#[derive(Debug, Error)]
pub enum CliError {
    /// The engine configuration could not be loaded or used
    #[error("{0}")]
    Config(ReplicationError),

    /// stdin/stdout failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A response could not be encoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A shell request could not be decoded
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl CliError {
    /// Stable code string reported in error responses
    pub fn code_str(&self) -> &'static str {
        match self {
            Self::Config(_) => "WALHOOK_CLI_CONFIG_ERROR",
            Self::Io(_) | Self::Json(_) => "WALHOOK_CLI_IO_ERROR",
            Self::BadRequest(_) => "WALHOOK_CLI_BAD_REQUEST",
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
