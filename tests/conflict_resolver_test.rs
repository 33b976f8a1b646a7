//! Conflict detection and the three resolution strategies.

use copilot_memory::conflict::{self, Strategy};
use copilot_memory::sections::{self, Position};
use tempfile::TempDir;

fn workspace_with_conflict() -> TempDir {
    let ws = TempDir::new().unwrap();
    sections::insert_section(ws.path(), "Build", "original", Position::Last).unwrap();
    let snapshot = sections::to_snapshot(&sections::read_sections(ws.path()).unwrap());
    let full_hash_before = {
        let path = ws.path().join(".github").join("copilot-instructions.md");
        let content = std::fs::read_to_string(path).unwrap();
        copilot_memory::fs_state::sha256_hex(content.as_bytes())
    };

    sections::update_section(ws.path(), "Build", "external edit", None, None).unwrap();
    sections::update_section(
        ws.path(),
        "Build",
        "local edit",
        Some(&full_hash_before),
        Some(&snapshot),
    )
    .unwrap();

    ws
}

#[test]
fn detect_conflicts_finds_the_marker_block() {
    let ws = workspace_with_conflict();
    let conflicts = conflict::detect_conflicts(ws.path()).unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].heading, "Build");
    assert_eq!(conflicts[0].external_body, "external edit");
    assert_eq!(conflicts[0].local_body, "local edit");
}

#[test]
fn resolve_use_external_keeps_external_body() {
    let ws = workspace_with_conflict();
    conflict::resolve_conflict(ws.path(), "Build", Strategy::UseExternal, None).unwrap();

    let sections = sections::read_sections(ws.path()).unwrap();
    assert_eq!(sections[0].body, "external edit");
    assert!(conflict::detect_conflicts(ws.path()).unwrap().is_empty());
}

#[test]
fn resolve_use_local_keeps_local_body() {
    let ws = workspace_with_conflict();
    conflict::resolve_conflict(ws.path(), "Build", Strategy::UseLocal, None).unwrap();

    let sections = sections::read_sections(ws.path()).unwrap();
    assert_eq!(sections[0].body, "local edit");
}

#[test]
fn resolve_use_manual_requires_manual_content() {
    let ws = workspace_with_conflict();
    let err = conflict::resolve_conflict(ws.path(), "Build", Strategy::UseManual, None).unwrap_err();
    assert!(matches!(err, copilot_memory::error::CoreError::Conflict(_)));
}

#[test]
fn resolve_use_manual_substitutes_given_text() {
    let ws = workspace_with_conflict();
    conflict::resolve_conflict(ws.path(), "Build", Strategy::UseManual, Some("merged by hand")).unwrap();

    let sections = sections::read_sections(ws.path()).unwrap();
    assert_eq!(sections[0].body, "merged by hand");
}

#[test]
fn resolve_without_conflict_is_not_found() {
    let ws = TempDir::new().unwrap();
    sections::insert_section(ws.path(), "Clean", "body", Position::Last).unwrap();
    let err =
        conflict::resolve_conflict(ws.path(), "Clean", Strategy::UseLocal, None).unwrap_err();
    assert!(matches!(err, copilot_memory::error::CoreError::NotFound(_)));
}
