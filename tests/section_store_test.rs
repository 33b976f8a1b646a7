//! Section-level CRUD and hash-based optimistic concurrency on the
//! instructions file.

use copilot_memory::error::CoreError;
use copilot_memory::sections::{self, Position};
use tempfile::TempDir;

fn workspace() -> TempDir {
    TempDir::new().expect("failed to create temp workspace")
}

#[test]
fn insert_then_read_round_trips() {
    let ws = workspace();
    sections::insert_section(ws.path(), "Build", "Run `cargo build`.", Position::Last).unwrap();

    let read = sections::read_sections(ws.path()).unwrap();
    assert_eq!(read.len(), 1);
    assert_eq!(read[0].heading, "Build");
    assert_eq!(read[0].body, "Run `cargo build`.");
}

#[test]
fn insert_duplicate_heading_is_rejected() {
    let ws = workspace();
    sections::insert_section(ws.path(), "Build", "first", Position::Last).unwrap();
    let err = sections::insert_section(ws.path(), "Build", "second", Position::Last).unwrap_err();
    assert!(matches!(err, CoreError::DuplicateHeading(_)));
}

#[test]
fn insert_before_missing_anchor_is_rejected() {
    let ws = workspace();
    let err =
        sections::insert_section(ws.path(), "Build", "body", Position::Before("Nope")).unwrap_err();
    assert!(matches!(err, CoreError::AnchorNotFound(_)));
}

#[test]
fn insert_respects_position() {
    let ws = workspace();
    sections::insert_section(ws.path(), "A", "a", Position::Last).unwrap();
    sections::insert_section(ws.path(), "C", "c", Position::Last).unwrap();
    sections::insert_section(ws.path(), "B", "b", Position::After("A")).unwrap();

    let headings: Vec<String> = sections::read_sections(ws.path())
        .unwrap()
        .into_iter()
        .map(|s| s.heading)
        .collect();
    assert_eq!(headings, vec!["A", "B", "C"]);
}

#[test]
fn update_without_expected_hash_overwrites() {
    let ws = workspace();
    sections::insert_section(ws.path(), "Build", "old", Position::Last).unwrap();
    let outcome = sections::update_section(ws.path(), "Build", "new", None, None).unwrap();
    assert!(outcome.success);
    assert!(!outcome.auto_merged);

    let read = sections::read_sections(ws.path()).unwrap();
    assert_eq!(read[0].body, "new");
}

#[test]
fn update_creates_section_if_missing() {
    let ws = workspace();
    let outcome = sections::update_section(ws.path(), "New", "body", None, None).unwrap();
    assert!(outcome.success);
    let read = sections::read_sections(ws.path()).unwrap();
    assert_eq!(read.len(), 1);
    assert_eq!(read[0].heading, "New");
}

#[test]
fn concurrent_edit_produces_conflict_markers() {
    let ws = workspace();
    sections::insert_section(ws.path(), "Build", "original", Position::Last).unwrap();
    let snapshot = sections::to_snapshot(&sections::read_sections(ws.path()).unwrap());
    let full_hash_before = sha256_of_file(ws.path());

    // Someone else edits the section out from under us.
    sections::update_section(ws.path(), "Build", "externally changed", None, None).unwrap();

    let outcome = sections::update_section(
        ws.path(),
        "Build",
        "my local edit",
        Some(&full_hash_before),
        Some(&snapshot),
    )
    .unwrap();

    assert!(!outcome.success);
    assert!(outcome.conflict.is_some());

    let read = sections::read_sections(ws.path()).unwrap();
    let build = read.iter().find(|s| s.heading == "Build").unwrap();
    assert!(build.body.contains("<<<<<<< HEAD"));
    assert!(build.body.contains("externally changed"));
    assert!(build.body.contains("my local edit"));
    assert!(build.body.contains(">>>>>>> MCP Update (local)"));
}

#[test]
fn update_with_snapshot_only_auto_merges_disjoint_section() {
    let ws = workspace();
    sections::insert_section(ws.path(), "A", "x", Position::Last).unwrap();
    sections::insert_section(ws.path(), "B", "y", Position::Last).unwrap();
    let snapshot = sections::to_snapshot(&sections::read_sections(ws.path()).unwrap());

    // Someone else edits a different section; we never learn the new full hash.
    sections::update_section(ws.path(), "B", "y2", None, None).unwrap();

    let outcome =
        sections::update_section(ws.path(), "A", "x2", None, Some(&snapshot)).unwrap();

    assert!(outcome.success);
    assert!(outcome.auto_merged);
    assert!(outcome.conflict.is_none());

    let read = sections::read_sections(ws.path()).unwrap();
    let a = read.iter().find(|s| s.heading == "A").unwrap();
    let b = read.iter().find(|s| s.heading == "B").unwrap();
    assert_eq!(a.body, "x2");
    assert_eq!(b.body, "y2");
}

#[test]
fn delete_missing_heading_is_not_found() {
    let ws = workspace();
    let err = sections::delete_section(ws.path(), "Nope").unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

fn sha256_of_file(workspace: &std::path::Path) -> String {
    let path = workspace.join(".github").join("copilot-instructions.md");
    let content = std::fs::read_to_string(path).unwrap_or_default();
    copilot_memory::fs_state::sha256_hex(content.as_bytes())
}
