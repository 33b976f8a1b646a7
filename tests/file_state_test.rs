//! Content hashing and hash-gated writes.

use copilot_memory::fs_state::{self, WriteOutcome};
use tempfile::TempDir;

#[test]
fn sha256_hex_is_stable_and_distinguishes_content() {
    let a = fs_state::sha256_hex(b"hello");
    let b = fs_state::sha256_hex(b"hello");
    let c = fs_state::sha256_hex(b"world");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.len(), 64);
}

#[test]
fn write_with_expected_succeeds_when_hash_matches() {
    let ws = TempDir::new().unwrap();
    let path = ws.path().join("file.txt");
    std::fs::write(&path, "original").unwrap();
    let hash = fs_state::sha256_hex(b"original");

    match fs_state::write_with_expected(&path, "updated", &hash).unwrap() {
        WriteOutcome::Written(state) => assert_eq!(state.hash, fs_state::sha256_hex(b"updated")),
        WriteOutcome::Conflict(_) => panic!("expected a successful write"),
    }
}

#[test]
fn write_with_expected_detects_a_stale_hash() {
    let ws = TempDir::new().unwrap();
    let path = ws.path().join("file.txt");
    std::fs::write(&path, "original").unwrap();

    let stale_hash = fs_state::sha256_hex(b"something else entirely");
    match fs_state::write_with_expected(&path, "updated", &stale_hash).unwrap() {
        WriteOutcome::Conflict(c) => {
            assert_eq!(c.expected_hash, stale_hash);
            assert_eq!(c.current_hash, fs_state::sha256_hex(b"original"));
        }
        WriteOutcome::Written(_) => panic!("expected a conflict"),
    }

    // The file must be untouched on conflict.
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
}

#[test]
fn write_unconditional_creates_parent_directories() {
    let ws = TempDir::new().unwrap();
    let path = ws.path().join("a").join("b").join("c.txt");
    fs_state::write_unconditional(&path, "content").unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "content");
}
