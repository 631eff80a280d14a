//! Fault injection for replication hooks
//!
//! A test controller arms at most one fault: a hook method and the result
//! code it should return. The next call to that method returns the code
//! instead of doing its work, and the fault is consumed. Calls to other
//! methods are unaffected.
//!
//! # Usage
//!
//! ```ignore
//! session.faults_mut().inject(HookMethod::Frames, ErrorCode::LeadershipLost);
//! ```
//!
//! A fault can also be armed from the environment when a session is created:
//!
//! ```bash
//! WALHOOK_FAULT=frames:IOERR_LEADERSHIP_LOST cargo test
//! ```

use tracing::warn;

use super::errors::{ErrorCode, ReplicationError, ReplicationResult};
use super::hook::HookMethod;

/// Environment variable read by [`FaultInjector::from_env`].
pub const FAULT_ENV_VAR: &str = "WALHOOK_FAULT";

/// Holds at most one pending (method, code) fault.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultInjector {
    pending: Option<(HookMethod, ErrorCode)>,
}

impl FaultInjector {
    /// Create an injector with no pending fault.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an injector armed from `WALHOOK_FAULT`, if set.
    ///
    /// The value has the form `method:CODE`, e.g. `end:IOERR_NOT_LEADER`.
    pub fn from_env() -> ReplicationResult<Self> {
        match std::env::var(FAULT_ENV_VAR) {
            Ok(value) => Self::parse(&value),
            Err(_) => Ok(Self::new()),
        }
    }

    /// Parse a `method:CODE` fault description.
    pub fn parse(value: &str) -> ReplicationResult<Self> {
        let (method, code) = value.split_once(':').ok_or_else(|| {
            ReplicationError::contract_violation(format!(
                "fault must be method:CODE, got {:?}",
                value
            ))
        })?;

        let method = method.trim().parse::<HookMethod>()?;
        let code = ErrorCode::from_name(code.trim()).ok_or_else(|| {
            ReplicationError::not_found(format!("unknown result code: {}", code))
        })?;

        let mut injector = Self::new();
        injector.inject(method, code);
        Ok(injector)
    }

    /// Arm a fault, replacing any pending one.
    pub fn inject(&mut self, method: HookMethod, code: ErrorCode) {
        self.pending = Some((method, code));
    }

    /// Disarm the pending fault, if any.
    pub fn clear(&mut self) {
        self.pending = None;
    }

    /// The pending fault, if any.
    pub fn pending(&self) -> Option<(HookMethod, ErrorCode)> {
        self.pending
    }

    /// Consume the pending fault if it targets `method`.
    ///
    /// Returns the error the hook must report verbatim.
    pub fn fire(&mut self, method: HookMethod) -> Option<ReplicationError> {
        match self.pending {
            Some((target, code)) if target == method => {
                self.pending = None;
                warn!(method = %method, code = %code, "injected replication fault fired");
                Some(ReplicationError::new(
                    code,
                    format!("injected fault on {}", method),
                ))
            }
            _ => None,
        }
    }
}
