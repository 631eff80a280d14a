//! Accept-everything replication plugin.
//!
//! Every hook succeeds and nothing is tracked. Used to exercise the
//! registration directory and engines that only need *a* plugin present.

use super::errors::ReplicationResult;
use super::hook::{Frame, WalReplication};
use super::session::SessionContext;

/// Alternate registration name used alongside the forwarding plugin.
pub const NOOP_ALT_NAME: &str = "test-alt";

/// Plugin whose hooks are all no-ops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoopReplication {
    name: String,
}

impl NoopReplication {
    /// Create a no-op plugin registered under `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl WalReplication for NoopReplication {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin(&self, _session: &mut SessionContext) -> ReplicationResult<()> {
        Ok(())
    }

    fn abort(&self, _session: &mut SessionContext) -> ReplicationResult<()> {
        Ok(())
    }

    fn frames(
        &self,
        _session: &mut SessionContext,
        _page_size: usize,
        _frames: &[Frame<'_>],
        _truncate_size: u32,
        _is_commit: bool,
    ) -> ReplicationResult<()> {
        Ok(())
    }

    fn undo(&self, _session: &mut SessionContext) -> ReplicationResult<()> {
        Ok(())
    }

    fn end(&self, _session: &mut SessionContext) -> ReplicationResult<()> {
        Ok(())
    }
}
