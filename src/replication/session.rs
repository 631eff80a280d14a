//! Session Context
//!
//! One context per leader (connection, schema) pair. It is created fresh
//! each time leader replication is enabled, dropped when it is disabled,
//! and handed to every hook call of that session. No context is shared
//! between sessions, and only the thread driving the session mutates it.

use std::fmt;

use tracing::error;

use super::batch::FrameSink;
use super::errors::ReplicationResult;
use super::fault::FaultInjector;
use super::hook::{HookMethod, SessionArg};
use super::state::{HookEvent, SessionPhase};

/// Per-session hook accounting.
///
/// Counters only increase; they are reset together with the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookCounters {
    begin_calls: u64,
    abort_calls: u64,
    frames_calls: u64,
    undo_calls: u64,
    end_calls: u64,
    /// Hook calls that returned an error
    failures: u64,
    /// Batches handed to the sink
    batches_forwarded: u64,
    /// Pages handed to the sink
    pages_forwarded: u64,
}

impl HookCounters {
    /// Count one invocation of `method`.
    pub fn record_call(&mut self, method: HookMethod) {
        let slot = match method {
            HookMethod::Begin => &mut self.begin_calls,
            HookMethod::Abort => &mut self.abort_calls,
            HookMethod::Frames => &mut self.frames_calls,
            HookMethod::Undo => &mut self.undo_calls,
            HookMethod::End => &mut self.end_calls,
        };
        *slot += 1;
    }

    /// Count one failed hook call.
    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Count one batch of `pages` pages handed to the sink.
    pub fn record_forward(&mut self, pages: usize) {
        self.batches_forwarded += 1;
        self.pages_forwarded += pages as u64;
    }

    /// Invocations of `method`.
    pub fn calls(&self, method: HookMethod) -> u64 {
        match method {
            HookMethod::Begin => self.begin_calls,
            HookMethod::Abort => self.abort_calls,
            HookMethod::Frames => self.frames_calls,
            HookMethod::Undo => self.undo_calls,
            HookMethod::End => self.end_calls,
        }
    }

    /// Failed hook calls.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Batches handed to the sink.
    pub fn batches_forwarded(&self) -> u64 {
        self.batches_forwarded
    }

    /// Pages handed to the sink.
    pub fn pages_forwarded(&self) -> u64 {
        self.pages_forwarded
    }
}

/// Replication state of one leader session.
pub struct SessionContext {
    arg: SessionArg,
    phase: SessionPhase,
    faults: FaultInjector,
    sink: Option<Box<dyn FrameSink>>,
    counters: HookCounters,
}

impl SessionContext {
    /// Create an idle session with no fault and no sink.
    pub fn new(arg: SessionArg) -> Self {
        Self {
            arg,
            phase: SessionPhase::Idle,
            faults: FaultInjector::new(),
            sink: None,
            counters: HookCounters::default(),
        }
    }

    /// The value supplied by the engine when the session started.
    pub fn arg(&self) -> SessionArg {
        self.arg
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Fail with a contract violation if `method` is not accepted in the
    /// current phase.
    pub fn check(&self, method: HookMethod) -> ReplicationResult<()> {
        self.phase.ensure_accepts(method).map_err(|err| {
            error!(
                session = self.arg.0,
                method = %method,
                phase = self.phase.name(),
                "replication hook contract violation"
            );
            err
        })
    }

    /// Apply `event` to the phase.
    ///
    /// On a contract violation the phase is left unchanged and the
    /// violation is returned.
    pub fn advance(&mut self, event: HookEvent, succeeded: bool) -> ReplicationResult<SessionPhase> {
        self.check(event.method())?;
        Ok(self.settle(event, succeeded))
    }

    /// Apply the outcome of a hook whose phase `check` already accepted.
    pub(crate) fn settle(&mut self, event: HookEvent, succeeded: bool) -> SessionPhase {
        self.phase = self.phase.next(event, succeeded);
        self.phase
    }

    /// Pending fault, if any.
    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Fault control for test controllers.
    pub fn faults_mut(&mut self) -> &mut FaultInjector {
        &mut self.faults
    }

    /// Forward frames to `sink` from now on.
    pub fn set_sink(&mut self, sink: Box<dyn FrameSink>) {
        self.sink = Some(sink);
    }

    /// Stop forwarding.
    pub fn clear_sink(&mut self) -> Option<Box<dyn FrameSink>> {
        self.sink.take()
    }

    /// Check if a sink is configured.
    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// The configured sink, if any.
    pub fn sink_mut(&mut self) -> Option<&mut (dyn FrameSink + 'static)> {
        self.sink.as_deref_mut()
    }

    /// Hook accounting.
    pub fn counters(&self) -> &HookCounters {
        &self.counters
    }

    /// Hook accounting, for plugins.
    pub fn counters_mut(&mut self) -> &mut HookCounters {
        &mut self.counters
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("arg", &self.arg)
            .field("phase", &self.phase)
            .field("faults", &self.faults)
            .field("sink", &self.sink.as_ref().map(|s| s.target()))
            .field("counters", &self.counters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::{ErrorCode, FrameBatch};

    struct NullSink;

    impl FrameSink for NullSink {
        fn apply_frames(&mut self, _batch: &FrameBatch) -> ReplicationResult<()> {
            Ok(())
        }

        fn apply_undo(&mut self) -> ReplicationResult<()> {
            Ok(())
        }

        fn target(&self) -> String {
            "null".to_string()
        }
    }

    #[test]
    fn test_new_session_is_idle_and_bare() {
        let session = SessionContext::new(SessionArg(7));
        assert_eq!(session.arg(), SessionArg(7));
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert!(session.faults().pending().is_none());
        assert!(!session.has_sink());
    }

    #[test]
    fn test_violation_leaves_phase_unchanged() {
        let mut session = SessionContext::new(SessionArg(1));
        let err = session.advance(HookEvent::Undo, true).unwrap_err();
        assert!(err.is_contract_violation());
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_advance_agrees_with_transition_table() {
        let phases = [
            SessionPhase::Idle,
            SessionPhase::Pending,
            SessionPhase::Writing,
            SessionPhase::Committed,
            SessionPhase::Undone,
            SessionPhase::Error,
        ];
        let events = [
            HookEvent::Begin,
            HookEvent::Abort,
            HookEvent::Frames { is_commit: false },
            HookEvent::Frames { is_commit: true },
            HookEvent::Undo,
            HookEvent::End,
        ];

        for from in phases {
            for event in events {
                for succeeded in [true, false] {
                    let mut session = SessionContext::new(SessionArg(1));
                    session.phase = from;
                    let expected = from.transition(event, succeeded);
                    let actual = session.advance(event, succeeded);

                    assert_eq!(actual.is_ok(), expected.is_ok(), "{:?} {:?}", from, event);
                    match expected {
                        Ok(next) => assert_eq!(session.phase(), next),
                        Err(_) => assert_eq!(session.phase(), from),
                    }
                }
            }
        }
    }

    #[test]
    fn test_sink_and_fault_are_independent_of_phase() {
        let mut session = SessionContext::new(SessionArg(1));
        session.advance(HookEvent::Begin, true).unwrap();
        session.faults_mut().inject(HookMethod::End, ErrorCode::NotLeader);
        session.set_sink(Box::new(NullSink));

        assert!(session.clear_sink().is_some());
        assert!(session.clear_sink().is_none());
        assert_eq!(session.phase(), SessionPhase::Pending);
        assert_eq!(session.faults().pending(), Some((HookMethod::End, ErrorCode::NotLeader)));
    }

    #[test]
    fn test_counters_track_forwarding() {
        let mut counters = HookCounters::default();
        counters.record_call(HookMethod::Frames);
        counters.record_forward(3);
        counters.record_forward(2);
        assert_eq!(counters.calls(HookMethod::Frames), 1);
        assert_eq!(counters.batches_forwarded(), 2);
        assert_eq!(counters.pages_forwarded(), 5);
    }

    #[test]
    fn test_debug_names_sink_target() {
        let mut session = SessionContext::new(SessionArg(1));
        session.set_sink(Box::new(NullSink));
        assert!(format!("{:?}", session).contains("null"));
    }
}
