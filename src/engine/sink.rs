//! Follower sink
//!
//! Applies forwarded batches into a schema of another connection, the way
//! a directly attached follower would. The follower connection is shared
//! behind a mutex so the test harness can read from it between commits.

use std::sync::{Arc, Mutex, MutexGuard};

use super::connection::Connection;
use crate::replication::{ErrorCode, FrameBatch, FrameSink, ReplicationError, ReplicationResult};

/// [`FrameSink`] writing into a follower schema.
#[derive(Debug, Clone)]
pub struct FollowerSink {
    follower: Arc<Mutex<Connection>>,
    schema: String,
}

impl FollowerSink {
    pub fn new(follower: Arc<Mutex<Connection>>, schema: impl Into<String>) -> Self {
        Self {
            follower,
            schema: schema.into(),
        }
    }

    fn lock(&self) -> ReplicationResult<MutexGuard<'_, Connection>> {
        self.follower.lock().map_err(|_| {
            ReplicationError::new(
                ErrorCode::Error,
                format!("follower connection for schema {} is poisoned", self.schema),
            )
        })
    }
}

impl FrameSink for FollowerSink {
    fn apply_frames(&mut self, batch: &FrameBatch) -> ReplicationResult<()> {
        self.lock()?.apply_frames(&self.schema, batch)
    }

    fn apply_undo(&mut self) -> ReplicationResult<()> {
        self.lock()?.apply_undo(&self.schema)
    }

    fn target(&self) -> String {
        format!("follower:{}", self.schema)
    }
}
