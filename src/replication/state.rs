//! Session Phase State Machine
//!
//! One phase per leader session. Transitions:
//!
//! | From                       | Event                   | To        |
//! |----------------------------|-------------------------|-----------|
//! | Idle, Error                | begin ok                | Pending   |
//! | Idle, Error                | begin failed            | Error     |
//! | Pending                    | abort ok                | Idle      |
//! | Pending, Writing           | frames ok, not commit   | Writing   |
//! | Pending, Writing           | frames ok, commit       | Committed |
//! | Pending, Writing, Error    | undo ok                 | Undone    |
//! | Pending, Committed, Undone | end (ok or failed)      | Idle      |
//!
//! Any other failed hook moves to Error. A hook invoked from a phase not
//! listed for it is a contract violation and leaves the phase untouched.

use super::errors::{ReplicationError, ReplicationResult};
use super::hook::HookMethod;

/// Replication phase of one leader session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionPhase {
    /// No transaction in flight
    #[default]
    Idle,

    /// Transaction announced, no frames delivered yet
    Pending,

    /// At least one non-final batch delivered
    Writing,

    /// Final batch delivered, waiting for `end`
    Committed,

    /// Rolled back, waiting for `end`
    Undone,

    /// A hook failed; only `begin` or `undo` may follow
    Error,
}

/// A hook call as seen by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    Begin,
    Abort,
    Frames { is_commit: bool },
    Undo,
    End,
}

impl HookEvent {
    /// The hook method producing this event.
    pub fn method(&self) -> HookMethod {
        match self {
            Self::Begin => HookMethod::Begin,
            Self::Abort => HookMethod::Abort,
            Self::Frames { .. } => HookMethod::Frames,
            Self::Undo => HookMethod::Undo,
            Self::End => HookMethod::End,
        }
    }
}

impl SessionPhase {
    /// Create the initial phase.
    pub fn new() -> Self {
        Self::Idle
    }

    /// Check whether `method` may be invoked from this phase.
    pub fn accepts(&self, method: HookMethod) -> bool {
        match method {
            HookMethod::Begin => matches!(self, Self::Idle | Self::Error),
            HookMethod::Abort => matches!(self, Self::Pending),
            HookMethod::Frames => matches!(self, Self::Pending | Self::Writing),
            HookMethod::Undo => matches!(self, Self::Pending | Self::Writing | Self::Error),
            HookMethod::End => matches!(self, Self::Pending | Self::Committed | Self::Undone),
        }
    }

    /// Fail with a contract violation if `method` is not accepted.
    pub fn ensure_accepts(&self, method: HookMethod) -> ReplicationResult<()> {
        if self.accepts(method) {
            Ok(())
        } else {
            Err(ReplicationError::contract_violation(format!(
                "{} invoked in phase {}",
                method,
                self.name()
            )))
        }
    }

    /// Compute the phase after `event` completed.
    ///
    /// `succeeded` is the outcome of the hook's own work (fault, forwarding).
    pub fn transition(self, event: HookEvent, succeeded: bool) -> ReplicationResult<Self> {
        self.ensure_accepts(event.method())?;
        Ok(self.next(event, succeeded))
    }

    /// Phase after `event`, for a caller that already checked acceptance.
    pub(crate) fn next(self, event: HookEvent, succeeded: bool) -> Self {
        match (event, succeeded) {
            // The bracket always closes.
            (HookEvent::End, _) => Self::Idle,
            (_, false) => Self::Error,
            (HookEvent::Begin, true) => Self::Pending,
            (HookEvent::Abort, true) => Self::Idle,
            (HookEvent::Frames { is_commit: false }, true) => Self::Writing,
            (HookEvent::Frames { is_commit: true }, true) => Self::Committed,
            (HookEvent::Undo, true) => Self::Undone,
        }
    }

    /// True when the next `frames` batch starts a follower-side transaction.
    pub fn is_begin_batch(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// True while a transaction is between `begin` and `end`.
    pub fn in_transaction(&self) -> bool {
        !matches!(self, Self::Idle | Self::Error)
    }

    /// Phase name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Writing => "writing",
            Self::Committed => "committed",
            Self::Undone => "undone",
            Self::Error => "error",
        }
    }
}
