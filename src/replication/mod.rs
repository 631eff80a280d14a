//! Replication Hook Subsystem
//!
//! The storage engine notifies a pluggable replication backend of every
//! durability-relevant event of a leader transaction: begin, frame
//! delivery, abort, undo and end. The engine knows nothing about the
//! transport; the backend knows nothing about the page cache.
//!
//! - Exactly one leader; at most one directly attached follower
//! - Hooks are invoked synchronously and serially per session
//! - Every hook error reaches the engine's caller
//! - The registry is the only process-wide state
//!
//! [`ForwardingReplication`] is the reference backend: it enforces the
//! [`SessionPhase`] state machine, honours injected faults and forwards
//! normalised [`FrameBatch`]es into a [`FrameSink`].

mod batch;
mod errors;
mod fault;
mod forwarding;
mod hook;
mod noop;
mod registry;
mod session;
mod state;

pub use batch::{FrameBatch, FrameSink};
pub use errors::{ErrorCode, ReplicationError, ReplicationResult};
pub use fault::{FaultInjector, FAULT_ENV_VAR};
pub use forwarding::{ForwardingReplication, FORWARDING_NAME};
pub use hook::{Frame, HookMethod, SessionArg, WalReplication};
pub use noop::{NoopReplication, NOOP_ALT_NAME};
pub use registry::{global, ReplicationRegistry};
pub use session::{HookCounters, SessionContext};
pub use state::{HookEvent, SessionPhase};
