//! Replication Hook Interface
//!
//! The storage engine calls these hooks synchronously, in order, on the
//! thread performing the write:
//!
//! ```text
//! begin ─┬─ abort                                  (nothing written)
//!        ├─ frames* ── frames(commit) ── end       (committed)
//!        ├─ frames* ── undo ── end                 (rolled back)
//!        └─ end                                    (nothing to write)
//! ```
//!
//! A hook returning an error always reaches the engine's caller. For
//! `begin` and `frames` the write is then treated as not having happened.

use std::fmt;
use std::str::FromStr;

use super::errors::{ReplicationError, ReplicationResult};
use super::session::SessionContext;

/// Opaque value supplied by the engine when a leader session starts and
/// handed back, unchanged, on every hook call of that session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SessionArg(pub u64);

/// One changed page captured when a transaction flushes dirty pages.
///
/// The page bytes are borrowed for the duration of the hook call only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// 1-based page number
    pub page_number: u32,
    /// Page content, exactly `page_size` bytes
    pub data: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Create a new frame.
    pub fn new(page_number: u32, data: &'a [u8]) -> Self {
        Self { page_number, data }
    }
}

/// The five hook methods, used to name fault targets and log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookMethod {
    Begin,
    Abort,
    Frames,
    Undo,
    End,
}

impl HookMethod {
    /// All hook methods in protocol order.
    pub const ALL: [HookMethod; 5] = [
        HookMethod::Begin,
        HookMethod::Abort,
        HookMethod::Frames,
        HookMethod::Undo,
        HookMethod::End,
    ];

    /// Lowercase method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::Abort => "abort",
            Self::Frames => "frames",
            Self::Undo => "undo",
            Self::End => "end",
        }
    }
}

impl fmt::Display for HookMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookMethod {
    type Err = ReplicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str() == s)
            .ok_or_else(|| ReplicationError::not_found(format!("unknown hook method: {}", s)))
    }
}

/// A replication backend.
///
/// Implementations are registered by name in a
/// [`ReplicationRegistry`](super::ReplicationRegistry) and invoked serially
/// per session. The session context is owned by the engine's
/// (connection, schema) pair and passed on every call, so one plugin
/// instance can serve any number of sessions.
pub trait WalReplication: Send + Sync {
    /// Registration name, unique within a registry.
    fn name(&self) -> &str;

    /// A leader transaction is starting.
    fn begin(&self, session: &mut SessionContext) -> ReplicationResult<()>;

    /// The transaction was abandoned before any frames were written.
    fn abort(&self, session: &mut SessionContext) -> ReplicationResult<()>;

    /// One batch of changed pages. Called one or more times per transaction;
    /// `is_commit` is set only on the batch completing it. `truncate_size`
    /// is the database size in pages after commit, 0 if unspecified.
    fn frames(
        &self,
        session: &mut SessionContext,
        page_size: usize,
        frames: &[Frame<'_>],
        truncate_size: u32,
        is_commit: bool,
    ) -> ReplicationResult<()>;

    /// The transaction is rolled back after at least one `frames` attempt.
    fn undo(&self, session: &mut SessionContext) -> ReplicationResult<()>;

    /// The replication bracket is closed, whatever the outcome.
    fn end(&self, session: &mut SessionContext) -> ReplicationResult<()>;
}
