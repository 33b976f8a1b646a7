//! Restricted-mode guard: writers refuse, readers proceed.

use copilot_memory::context::{self, ContextPatch};
use copilot_memory::error::CoreError;
use copilot_memory::sections::{self, Position};
use std::fs;
use tempfile::TempDir;

fn mark_restricted(ws: &std::path::Path) {
    let dir = ws.join(".copilot-state");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("restricted.flag"), "").unwrap();
}

#[test]
fn writers_refuse_when_restricted() {
    let ws = TempDir::new().unwrap();
    mark_restricted(ws.path());

    let err = sections::insert_section(ws.path(), "X", "body", Position::Last).unwrap_err();
    assert!(matches!(err, CoreError::Restricted));

    let err = context::update(ws.path(), ContextPatch::default(), Some(false)).unwrap_err();
    assert!(matches!(err, CoreError::Restricted));
}

#[test]
fn readers_ignore_restricted_flag() {
    let ws = TempDir::new().unwrap();
    sections::insert_section(ws.path(), "X", "body", Position::Last).unwrap();
    mark_restricted(ws.path());

    let sections = sections::read_sections(ws.path()).unwrap();
    assert_eq!(sections.len(), 1);

    let ctx = context::read(ws.path()).unwrap();
    assert_eq!(ctx.focus.len(), 0);
}
