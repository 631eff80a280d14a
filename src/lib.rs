//! walhook - WAL replication hooks for a paged storage engine
//!
//! - `replication`: the plugin contract, reference plugins and the
//!   registration directory
//! - `engine`: an in-process page engine driving the hooks as leader and
//!   applying forwarded frames as follower
//! - `cli`: the JSON-line test shell behind the `walhook` binary

pub mod cli;
pub mod engine;
pub mod replication;
