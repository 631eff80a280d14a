//! In-process Page Engine
//!
//! A small paged database that plays both ends of replication:
//!
//! - A leader schema announces every write transaction to a
//!   [`WalReplication`](crate::replication::WalReplication) plugin
//! - A follower schema refuses local writes and applies forwarded batches
//! - Committed pages live in a checksummed write-ahead log until a
//!   checkpoint copies them into the page file
//!
//! [`FollowerSink`] connects the two: attached to a leader's session, it
//! applies each forwarded batch into a follower connection.

mod checkpoint;
mod config;
mod connection;
mod schema;
mod sink;
mod wal;

pub use checkpoint::{CheckpointMode, CheckpointResult};
pub use config::{EngineConfig, MAX_PAGE_SIZE, MIN_PAGE_SIZE};
pub use connection::Connection;
pub use sink::FollowerSink;
pub use wal::{frame_checksum, LogFrame, WriteAheadLog};
