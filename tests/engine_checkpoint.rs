//! Engine Checkpoint and Configuration Tests
//!
//! - Configuration loads from a JSON file
//! - Checkpoints copy committed frames only and report log sizes
//! - Non-passive checkpoints refuse to run beside an open transaction
//! - Followers checkpoint forwarded frames like local ones

use std::fs;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use walhook::engine::{CheckpointMode, CheckpointResult, Connection, EngineConfig, FollowerSink};
use walhook::replication::{ErrorCode, ForwardingReplication, ReplicationRegistry};

const PAGE: usize = 1024;
const MAIN: &str = "main";

fn page(fill: u8) -> Vec<u8> {
    vec![fill; PAGE]
}

fn open() -> Connection {
    let config = EngineConfig::default()
        .with_page_size(PAGE)
        .with_autocheckpoint(0);
    Connection::with_registry(config, Arc::new(ReplicationRegistry::new())).unwrap()
}

fn commit_pages(conn: &mut Connection, pages: &[(u32, u8)]) {
    conn.begin(MAIN).unwrap();
    for &(page_number, fill) in pages {
        conn.write_page(MAIN, page_number, &page(fill)).unwrap();
    }
    conn.commit(MAIN).unwrap();
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_load_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("walhook.json");
    fs::write(
        &path,
        r#"{ "page_size": 1024, "wal_autocheckpoint": 0, "default_schema": "data" }"#,
    )
    .unwrap();

    let config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.page_size, 1024);
    assert_eq!(config.wal_autocheckpoint, 0);

    let conn = Connection::open(config).unwrap();
    assert_eq!(conn.schemas(), vec!["data".to_string()]);
    assert_eq!(conn.config().page_size, 1024);
}

#[test]
fn test_load_invalid_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("walhook.json");
    fs::write(&path, r#"{ "page_size": 3000 }"#).unwrap();

    let err = EngineConfig::load(&path).unwrap_err();
    assert!(err.is_contract_violation());
}

#[test]
fn test_wrong_page_length_is_rejected() {
    let mut conn = open();
    conn.begin(MAIN).unwrap();
    let err = conn.write_page(MAIN, 1, &[0; 16]).unwrap_err();
    assert!(err.is_contract_violation());
}

// =============================================================================
// Checkpoint
// =============================================================================

#[test]
fn test_passive_checkpoint_counts_frames() {
    let mut conn = open();
    commit_pages(&mut conn, &[(1, 1), (2, 2)]);
    commit_pages(&mut conn, &[(1, 3)]);

    let result = conn.checkpoint(MAIN, CheckpointMode::Passive).unwrap();
    assert_eq!(result, CheckpointResult::new(3, 3));
    assert_eq!(conn.read_page(MAIN, 1).unwrap(), Some(page(3)));
    assert_eq!(conn.read_page(MAIN, 2).unwrap(), Some(page(2)));
}

#[test]
fn test_passive_checkpoint_skips_open_transaction() {
    let mut conn = open();
    commit_pages(&mut conn, &[(1, 1)]);

    conn.begin(MAIN).unwrap();
    conn.write_page(MAIN, 1, &page(9)).unwrap();
    conn.flush(MAIN).unwrap();

    let result = conn.checkpoint(MAIN, CheckpointMode::Passive).unwrap();
    assert_eq!(result, CheckpointResult::new(1, 1));

    conn.rollback(MAIN).unwrap();
    assert_eq!(conn.read_page(MAIN, 1).unwrap(), Some(page(1)));
}

#[test]
fn test_full_checkpoint_is_busy_during_transaction() {
    let mut conn = open();
    commit_pages(&mut conn, &[(1, 1)]);
    conn.begin(MAIN).unwrap();

    for mode in [CheckpointMode::Full, CheckpointMode::Restart, CheckpointMode::Truncate] {
        let err = conn.checkpoint(MAIN, mode).unwrap_err();
        assert_eq!(err.code, ErrorCode::Busy, "{}", mode);
    }
    conn.rollback(MAIN).unwrap();
    assert_eq!(
        conn.checkpoint(MAIN, CheckpointMode::Full).unwrap(),
        CheckpointResult::new(1, 1)
    );
}

#[test]
fn test_restart_and_truncate_empty_the_log() {
    let mut conn = open();
    commit_pages(&mut conn, &[(1, 1), (2, 2)]);

    let result = conn.checkpoint(MAIN, CheckpointMode::Restart).unwrap();
    assert_eq!(result, CheckpointResult::new(2, 2));
    assert_eq!(
        conn.checkpoint(MAIN, CheckpointMode::Passive).unwrap(),
        CheckpointResult::new(0, 0)
    );

    commit_pages(&mut conn, &[(3, 3)]);
    let result = conn.checkpoint(MAIN, CheckpointMode::Truncate).unwrap();
    assert_eq!(result, CheckpointResult::new(0, 0));

    assert_eq!(conn.page_count(MAIN).unwrap(), 3);
    for n in 1..=3u32 {
        assert_eq!(conn.read_page(MAIN, n).unwrap(), Some(page(n as u8)));
    }
}

#[test]
fn test_checkpoint_after_truncation_drops_pages() {
    let mut conn = open();
    commit_pages(&mut conn, &[(1, 1), (2, 2), (3, 3)]);
    conn.checkpoint(MAIN, CheckpointMode::Truncate).unwrap();

    conn.begin(MAIN).unwrap();
    conn.truncate(MAIN, 1).unwrap();
    conn.commit(MAIN).unwrap();
    conn.checkpoint(MAIN, CheckpointMode::Truncate).unwrap();

    assert_eq!(conn.page_count(MAIN).unwrap(), 1);
    assert_eq!(conn.read_page(MAIN, 2).unwrap(), None);

    // Growing again exposes zeroed pages, not the dropped ones.
    conn.begin(MAIN).unwrap();
    conn.write_page(MAIN, 3, &page(7)).unwrap();
    conn.commit(MAIN).unwrap();
    assert_eq!(conn.read_page(MAIN, 2).unwrap(), Some(page(0)));
}

#[test]
fn test_follower_checkpoints_forwarded_frames() {
    let registry = Arc::new(ReplicationRegistry::new());
    registry.register(Arc::new(ForwardingReplication::default()), true);
    let config = EngineConfig::default()
        .with_page_size(PAGE)
        .with_autocheckpoint(0);

    let mut follower = Connection::with_registry(config.clone(), registry.clone()).unwrap();
    follower.enable_follower(MAIN).unwrap();
    let follower = Arc::new(Mutex::new(follower));

    let mut leader = Connection::with_registry(config, registry).unwrap();
    leader.enable_leader(MAIN, None, None).unwrap();
    leader
        .session_mut(MAIN)
        .unwrap()
        .set_sink(Box::new(FollowerSink::new(follower.clone(), MAIN)));

    commit_pages(&mut leader, &[(1, 1), (2, 2)]);
    commit_pages(&mut leader, &[(2, 5)]);

    let mut follower = follower.lock().unwrap();
    let result = follower.checkpoint(MAIN, CheckpointMode::Truncate).unwrap();
    assert_eq!(result, CheckpointResult::new(0, 0));
    assert_eq!(follower.read_page(MAIN, 2).unwrap(), Some(page(5)));
    assert_eq!(follower.page_count(MAIN).unwrap(), 2);
}

#[test]
fn test_mode_from_str() {
    let mode: CheckpointMode = "truncate".parse().unwrap();
    assert_eq!(mode, CheckpointMode::Truncate);
    let err = "sideways".parse::<CheckpointMode>().unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);
}
