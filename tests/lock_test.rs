//! Process-wide lock: mutual exclusion and stale-lock eviction.

use copilot_memory::lock;
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::TempDir;

#[test]
fn with_lock_runs_the_closure_and_cleans_up() {
    let ws = TempDir::new().unwrap();
    let result = lock::with_lock(ws.path(), None, || Ok(42)).unwrap();
    assert_eq!(result, 42);
    assert!(!ws.path().join(".copilot-state").join(".lock").exists());
}

#[test]
fn stale_lock_is_evicted_and_retried() {
    let ws = TempDir::new().unwrap();
    let state_dir = ws.path().join(".copilot-state");
    fs::create_dir_all(&state_dir).unwrap();

    let ancient = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
        - 60_000;
    let stale_record = format!(
        r#"{{"session_id":"old-session","acquired_at":{ancient},"pid":999999}}"#
    );
    fs::write(state_dir.join(".lock"), stale_record).unwrap();

    // Default timeout is 5000ms; a lock older than 2x that is stale.
    let result = lock::with_lock(ws.path(), Some(200), || Ok("acquired")).unwrap();
    assert_eq!(result, "acquired");
}

#[test]
fn error_from_closure_still_releases_the_lock() {
    let ws = TempDir::new().unwrap();
    let _: Result<(), _> = lock::with_lock(ws.path(), None, || {
        Err(copilot_memory::error::CoreError::NotFound("x".to_string()))
    });
    assert!(!ws.path().join(".copilot-state").join(".lock").exists());
}
