//! Reference Forwarding Plugin
//!
//! Validates the hook contract end to end without any networking:
//! - Tracks the session phase and rejects out-of-order calls
//! - Honours the session's pending fault
//! - Copies each `frames` batch and applies it to the session's sink, if any
//!
//! Without a sink, hook calls are counted and change the phase but have no
//! other effect, which lets the state machine be exercised on its own.

use tracing::{debug, warn};

use super::batch::FrameBatch;
use super::errors::ReplicationResult;
use super::hook::{Frame, WalReplication};
use super::session::SessionContext;
use super::state::HookEvent;

/// Registration name used by the test harness.
pub const FORWARDING_NAME: &str = "test";

/// Reference plugin forwarding frames into an in-process follower.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardingReplication {
    name: String,
}

impl ForwardingReplication {
    /// Create a plugin registered under `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Run one hook: validate the phase once, fire or run `work`, settle.
    fn run<F>(&self, session: &mut SessionContext, event: HookEvent, work: F) -> ReplicationResult<()>
    where
        F: FnOnce(&mut SessionContext) -> ReplicationResult<()>,
    {
        let method = event.method();
        session.counters_mut().record_call(method);
        if let Err(err) = session.check(method) {
            session.counters_mut().record_failure();
            return Err(err);
        }

        let fired = session.faults_mut().fire(method);
        let result = match fired {
            Some(err) => Err(err),
            None => work(session),
        };

        let phase = session.settle(event, result.is_ok());
        debug!(
            plugin = %self.name,
            session = session.arg().0,
            method = %method,
            phase = phase.name(),
            ok = result.is_ok(),
            "replication hook"
        );

        if let Err(err) = &result {
            session.counters_mut().record_failure();
            warn!(
                plugin = %self.name,
                session = session.arg().0,
                method = %method,
                code = %err.code,
                "replication hook failed"
            );
        }
        result
    }
}

impl Default for ForwardingReplication {
    fn default() -> Self {
        Self::new(FORWARDING_NAME)
    }
}

impl WalReplication for ForwardingReplication {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin(&self, session: &mut SessionContext) -> ReplicationResult<()> {
        self.run(session, HookEvent::Begin, |_| Ok(()))
    }

    fn abort(&self, session: &mut SessionContext) -> ReplicationResult<()> {
        self.run(session, HookEvent::Abort, |_| Ok(()))
    }

    fn frames(
        &self,
        session: &mut SessionContext,
        page_size: usize,
        frames: &[Frame<'_>],
        truncate_size: u32,
        is_commit: bool,
    ) -> ReplicationResult<()> {
        let is_begin = session.phase().is_begin_batch();
        self.run(session, HookEvent::Frames { is_commit }, |session| {
            let Some(sink) = session.sink_mut() else {
                return Ok(());
            };

            let batch = FrameBatch::collect(is_begin, page_size, frames, truncate_size, is_commit)?;
            debug!(
                target_follower = %sink.target(),
                frames = batch.frame_count(),
                is_begin,
                is_commit,
                "forwarding frame batch"
            );
            sink.apply_frames(&batch)?;
            session.counters_mut().record_forward(batch.frame_count());
            Ok(())
        })
    }

    fn undo(&self, session: &mut SessionContext) -> ReplicationResult<()> {
        self.run(session, HookEvent::Undo, |session| match session.sink_mut() {
            Some(sink) => sink.apply_undo(),
            None => Ok(()),
        })
    }

    fn end(&self, session: &mut SessionContext) -> ReplicationResult<()> {
        self.run(session, HookEvent::End, |_| Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::replication::{
        ErrorCode, FrameSink, HookMethod, ReplicationError, SessionArg, SessionPhase,
    };

    #[derive(Debug, Default)]
    struct Recorded {
        batches: Vec<FrameBatch>,
        undos: usize,
        fail_next: Option<ErrorCode>,
    }

    struct RecordingSink(Arc<Mutex<Recorded>>);

    impl FrameSink for RecordingSink {
        fn apply_frames(&mut self, batch: &FrameBatch) -> ReplicationResult<()> {
            let mut recorded = self.0.lock().unwrap();
            if let Some(code) = recorded.fail_next.take() {
                return Err(ReplicationError::new(code, "sink refused"));
            }
            recorded.batches.push(batch.clone());
            Ok(())
        }

        fn apply_undo(&mut self) -> ReplicationResult<()> {
            self.0.lock().unwrap().undos += 1;
            Ok(())
        }

        fn target(&self) -> String {
            "recording".to_string()
        }
    }

    fn session_with_sink() -> (SessionContext, Arc<Mutex<Recorded>>) {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let mut session = SessionContext::new(SessionArg(1));
        session.set_sink(Box::new(RecordingSink(recorded.clone())));
        (session, recorded)
    }

    fn page(fill: u8) -> Vec<u8> {
        vec![fill; 16]
    }

    #[test]
    fn test_is_begin_only_on_first_batch() {
        let plugin = ForwardingReplication::default();
        let (mut session, recorded) = session_with_sink();
        let (a, b, c) = (page(1), page(2), page(3));

        plugin.begin(&mut session).unwrap();
        plugin.frames(&mut session, 16, &[Frame::new(1, &a)], 0, false).unwrap();
        plugin.frames(&mut session, 16, &[Frame::new(2, &b)], 0, false).unwrap();
        plugin.frames(&mut session, 16, &[Frame::new(3, &c)], 3, true).unwrap();
        plugin.end(&mut session).unwrap();

        let recorded = recorded.lock().unwrap();
        let flags: Vec<_> = recorded.batches.iter().map(|b| (b.is_begin, b.is_commit)).collect();
        assert_eq!(flags, vec![(true, false), (false, false), (false, true)]);
        assert_eq!(recorded.batches[2].truncate_size, 3);
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert_eq!(session.counters().pages_forwarded(), 3);
    }

    #[test]
    fn test_no_sink_only_moves_phase() {
        let plugin = ForwardingReplication::default();
        let mut session = SessionContext::new(SessionArg(2));
        let a = page(9);

        plugin.begin(&mut session).unwrap();
        // Wrong-sized page is not inspected without a sink.
        plugin.frames(&mut session, 4096, &[Frame::new(1, &a)], 0, true).unwrap();
        assert_eq!(session.phase(), SessionPhase::Committed);
        assert_eq!(session.counters().batches_forwarded(), 0);
    }

    #[test]
    fn test_sink_failure_moves_to_error() {
        let plugin = ForwardingReplication::default();
        let (mut session, recorded) = session_with_sink();
        recorded.lock().unwrap().fail_next = Some(ErrorCode::Busy);
        let a = page(1);

        plugin.begin(&mut session).unwrap();
        let err = plugin.frames(&mut session, 16, &[Frame::new(1, &a)], 0, true).unwrap_err();
        assert_eq!(err.code, ErrorCode::Busy);
        assert_eq!(session.phase(), SessionPhase::Error);

        plugin.undo(&mut session).unwrap();
        plugin.end(&mut session).unwrap();
        assert_eq!(recorded.lock().unwrap().undos, 1);
        assert_eq!(session.counters().failures(), 1);
    }

    #[test]
    fn test_malformed_batch_is_not_forwarded() {
        let plugin = ForwardingReplication::default();
        let (mut session, recorded) = session_with_sink();
        let short = vec![0u8; 3];

        plugin.begin(&mut session).unwrap();
        let err = plugin.frames(&mut session, 16, &[Frame::new(1, &short)], 0, true).unwrap_err();
        assert!(err.is_contract_violation());
        assert_eq!(session.phase(), SessionPhase::Error);
        assert!(recorded.lock().unwrap().batches.is_empty());
    }

    #[test]
    fn test_faulted_frames_skips_sink() {
        let plugin = ForwardingReplication::default();
        let (mut session, recorded) = session_with_sink();
        session.faults_mut().inject(HookMethod::Frames, ErrorCode::NotLeader);
        let a = page(1);

        plugin.begin(&mut session).unwrap();
        let err = plugin.frames(&mut session, 16, &[Frame::new(1, &a)], 0, true).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotLeader);
        assert!(recorded.lock().unwrap().batches.is_empty());
    }

    #[test]
    fn test_end_fault_still_closes() {
        let plugin = ForwardingReplication::default();
        let mut session = SessionContext::new(SessionArg(3));
        session.faults_mut().inject(HookMethod::End, ErrorCode::LeadershipLost);

        plugin.begin(&mut session).unwrap();
        let err = plugin.end(&mut session).unwrap_err();
        assert_eq!(err.code, ErrorCode::LeadershipLost);
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_out_of_order_call_is_flagged() {
        let plugin = ForwardingReplication::default();
        let mut session = SessionContext::new(SessionArg(4));
        session.faults_mut().inject(HookMethod::Abort, ErrorCode::Error);

        let err = plugin.abort(&mut session).unwrap_err();
        assert!(err.is_contract_violation());
        assert_eq!(session.phase(), SessionPhase::Idle);
        // A violation does not consume the pending fault.
        assert!(session.faults().pending().is_some());
        assert_eq!(session.counters().calls(HookMethod::Abort), 1);
        assert_eq!(session.counters().failures(), 1);
    }
}
