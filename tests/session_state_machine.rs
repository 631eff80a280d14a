//! Session State Machine Properties
//!
//! Random hook call sequences against the reference plugin, checked
//! against a separately written transition table:
//! - Accepted calls land in the phase the table predicts
//! - Rejected calls are contract violations and change nothing
//! - A fault hits exactly the next call to its method
//! - `is_begin` is set exactly when the session was pending

use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use walhook::replication::{
    ErrorCode, ForwardingReplication, Frame, FrameBatch, FrameSink, HookMethod,
    ReplicationResult, SessionArg, SessionContext, SessionPhase, WalReplication,
};

const PAGE: usize = 64;

#[derive(Debug, Clone, Copy)]
enum Call {
    Begin,
    Abort,
    Frames { is_commit: bool },
    Undo,
    End,
    Fault(HookMethod),
}

fn call_strategy() -> impl Strategy<Value = Call> {
    let method = prop::sample::select(HookMethod::ALL.to_vec());
    prop_oneof![
        3 => Just(Call::Begin),
        1 => Just(Call::Abort),
        3 => any::<bool>().prop_map(|is_commit| Call::Frames { is_commit }),
        1 => Just(Call::Undo),
        3 => Just(Call::End),
        1 => method.prop_map(Call::Fault),
    ]
}

/// Expected phase after a call accepted from `from`, or `None` when the
/// call is not allowed there.
fn expected(from: SessionPhase, call: Call, failed: bool) -> Option<SessionPhase> {
    use SessionPhase::*;

    match (call, from) {
        (Call::Begin, Idle | Error) => Some(if failed { Error } else { Pending }),
        (Call::Abort, Pending) => Some(if failed { Error } else { Idle }),
        (Call::Frames { is_commit }, Pending | Writing) => Some(match (failed, is_commit) {
            (true, _) => Error,
            (false, false) => Writing,
            (false, true) => Committed,
        }),
        (Call::Undo, Pending | Writing | Error) => Some(if failed { Error } else { Undone }),
        (Call::End, Pending | Committed | Undone) => Some(Idle),
        _ => None,
    }
}

fn method_of(call: Call) -> Option<HookMethod> {
    match call {
        Call::Begin => Some(HookMethod::Begin),
        Call::Abort => Some(HookMethod::Abort),
        Call::Frames { .. } => Some(HookMethod::Frames),
        Call::Undo => Some(HookMethod::Undo),
        Call::End => Some(HookMethod::End),
        Call::Fault(_) => None,
    }
}

#[derive(Clone, Default)]
struct FlagSink(Arc<Mutex<Vec<bool>>>);

impl FrameSink for FlagSink {
    fn apply_frames(&mut self, batch: &FrameBatch) -> ReplicationResult<()> {
        self.0.lock().unwrap().push(batch.is_begin);
        Ok(())
    }

    fn apply_undo(&mut self) -> ReplicationResult<()> {
        Ok(())
    }

    fn target(&self) -> String {
        "flags".to_string()
    }
}

proptest! {
    #[test]
    fn phase_follows_transition_table(calls in prop::collection::vec(call_strategy(), 1..60)) {
        let plugin = ForwardingReplication::default();
        let sink = FlagSink::default();
        let mut session = SessionContext::new(SessionArg(1));
        session.set_sink(Box::new(sink.clone()));

        let data = vec![0xab; PAGE];
        let frames = [Frame::new(1, &data)];
        let mut fault: Option<HookMethod> = None;
        let mut begin_flags = Vec::new();

        for call in calls {
            let Some(method) = method_of(call) else {
                if let Call::Fault(target) = call {
                    session.faults_mut().inject(target, ErrorCode::LeadershipLost);
                    fault = Some(target);
                }
                continue;
            };

            let from = session.phase();
            let fires = fault == Some(method);
            let want = expected(from, call, fires);
            let was_pending = from == SessionPhase::Pending;

            let result = match call {
                Call::Begin => plugin.begin(&mut session),
                Call::Abort => plugin.abort(&mut session),
                Call::Frames { is_commit } => plugin.frames(&mut session, PAGE, &frames, 1, is_commit),
                Call::Undo => plugin.undo(&mut session),
                Call::End => plugin.end(&mut session),
                Call::Fault(_) => unreachable!(),
            };

            match want {
                None => {
                    let err = result.unwrap_err();
                    prop_assert!(err.is_contract_violation());
                    prop_assert_eq!(session.phase(), from);
                }
                Some(next) => {
                    prop_assert_eq!(session.phase(), next);
                    if fires {
                        prop_assert_eq!(result.unwrap_err().code, ErrorCode::LeadershipLost);
                        fault = None;
                    } else {
                        prop_assert!(result.is_ok());
                        if matches!(call, Call::Frames { .. }) {
                            begin_flags.push(was_pending);
                        }
                    }
                }
            }
            prop_assert_eq!(session.faults().pending().map(|(m, _)| m), fault);
        }

        prop_assert_eq!(&*sink.0.lock().unwrap(), &begin_flags);
    }

    #[test]
    fn end_always_returns_to_idle(fail in any::<bool>(), commit in any::<bool>()) {
        let plugin = ForwardingReplication::default();
        let mut session = SessionContext::new(SessionArg(2));
        let data = vec![1; PAGE];

        plugin.begin(&mut session).unwrap();
        if commit {
            plugin.frames(&mut session, PAGE, &[Frame::new(1, &data)], 1, true).unwrap();
        }
        if fail {
            session.faults_mut().inject(HookMethod::End, ErrorCode::NotLeader);
        }

        let result = plugin.end(&mut session);
        prop_assert_eq!(result.is_err(), fail);
        prop_assert_eq!(session.phase(), SessionPhase::Idle);
    }
}
