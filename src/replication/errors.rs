//! Replication Error Types
//!
//! Every failure that crosses the hook boundary is a small integer code. The
//! message is for humans and logs only; callers branch on [`ErrorCode`].
//!
//! Propagation rules:
//! - Every error is returned to the immediate caller
//! - Nothing is retried inside this crate
//! - Contract violations are reported, never silently absorbed

use std::fmt;

use thiserror::Error;

/// Primary result code for generic failures.
const CODE_ERROR: i32 = 1;
/// Primary result code for I/O failures, used as the base of the extended
/// leadership codes.
const CODE_IOERR: i32 = 10;

/// Result codes surfaced across the replication boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Generic failure
    Error,

    /// Resource is held by an open write transaction
    Busy,

    /// Allocation failed while building a batch
    NoMem,

    /// Write attempted on a follower
    ReadOnly,

    /// Log frame failed checksum verification
    Corrupt,

    /// No plugin or schema with the requested name
    NotFound,

    /// A call was made in a state that does not permit it
    Misuse,

    /// This node is not the leader
    NotLeader,

    /// Leadership was lost while the transaction was in flight
    LeadershipLost,
}

impl ErrorCode {
    /// Every code, in ascending primary-code order.
    pub const ALL: [ErrorCode; 9] = [
        Self::Error,
        Self::Busy,
        Self::NoMem,
        Self::ReadOnly,
        Self::Corrupt,
        Self::NotFound,
        Self::Misuse,
        Self::NotLeader,
        Self::LeadershipLost,
    ];

    /// Integer value of the code.
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::Error => CODE_ERROR,
            Self::Busy => 5,
            Self::NoMem => 7,
            Self::ReadOnly => 8,
            Self::Corrupt => 11,
            Self::NotFound => 12,
            Self::Misuse => 21,
            Self::NotLeader => CODE_IOERR | (40 << 8),
            Self::LeadershipLost => CODE_IOERR | (41 << 8),
        }
    }

    /// Reverse of [`ErrorCode::as_i32`].
    pub fn from_i32(value: i32) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|code| code.as_i32() == value)
    }

    /// Look up a code by its stable name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|code| code.as_str() == name)
    }

    /// Stable name used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Busy => "BUSY",
            Self::NoMem => "NOMEM",
            Self::ReadOnly => "READONLY",
            Self::Corrupt => "CORRUPT",
            Self::NotFound => "NOTFOUND",
            Self::Misuse => "MISUSE",
            Self::NotLeader => "IOERR_NOT_LEADER",
            Self::LeadershipLost => "IOERR_LEADERSHIP_LOST",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Replication error: a result code plus context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ReplicationError({code}): {message}")]
pub struct ReplicationError {
    /// Result code returned to the caller
    pub code: ErrorCode,
    /// Error message
    pub message: String,
}

impl ReplicationError {
    /// Create a new replication error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create a contract violation error.
    ///
    /// A hook was invoked in a phase that does not accept it, meaning leader
    /// and follower may have diverged.
    pub fn contract_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Misuse, message)
    }

    /// Create a busy error.
    pub fn busy(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Busy, message)
    }

    /// Create an out-of-memory error.
    pub fn no_mem(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NoMem, message)
    }

    /// Create a read-only error.
    pub fn read_only(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ReadOnly, message)
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Create a not-leader error.
    pub fn not_leader(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotLeader, message)
    }

    /// Create a corruption error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Corrupt, message)
    }

    /// Check if this error reports a hook called out of order.
    pub fn is_contract_violation(&self) -> bool {
        self.code == ErrorCode::Misuse
    }

    /// Check if the error means this node must stop writing.
    pub fn is_leadership_error(&self) -> bool {
        matches!(self.code, ErrorCode::NotLeader | ErrorCode::LeadershipLost)
    }
}

/// Result type for replication operations
pub type ReplicationResult<T> = Result<T, ReplicationError>;
