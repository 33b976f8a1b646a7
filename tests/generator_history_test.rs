//! End-to-end instruction generation, history recording, and rollback.

use copilot_memory::context::DevContext;
use copilot_memory::history::{self, EntryKey};
use copilot_memory::{fragments, generator};
use std::fs;
use tempfile::TempDir;

fn write_fragment(ws: &std::path::Path, rel: &str, front_matter: &str, body: &str) {
    let path = ws.join(".copilot-instructions").join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, format!("---\n{front_matter}---\n{body}")).unwrap();
}

#[test]
fn generate_writes_instructions_file_and_history_entry() {
    let ws = TempDir::new().unwrap();
    write_fragment(
        ws.path(),
        "required.md",
        "category: general\nrequired: true\n",
        "# Always included\n\nCore guidance.",
    );

    let context = DevContext::default();
    let outcome = generator::generate(ws.path(), &context, None).unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.sections_count, 1);

    let instructions =
        fs::read_to_string(ws.path().join(".github").join("copilot-instructions.md")).unwrap();
    assert!(instructions.contains("# Copilot Instructions"));
    assert!(instructions.contains("Always included"));

    let entries = history::list(ws.path(), None).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].hash, outcome.generated_hash);
}

#[test]
fn generate_is_idempotent_for_unchanged_inputs() {
    let ws = TempDir::new().unwrap();
    write_fragment(
        ws.path(),
        "required.md",
        "category: general\nrequired: true\n",
        "# Always included\n\nCore guidance.",
    );

    let context = DevContext::default();
    let first = generator::generate(ws.path(), &context, None).unwrap();
    let second = generator::generate(ws.path(), &context, None).unwrap();

    assert_eq!(first.generated_hash, second.generated_hash);
    assert_eq!(history::list(ws.path(), None).unwrap().len(), 2);
}

#[test]
fn rollback_restores_prior_output_without_creating_a_new_entry() {
    let ws = TempDir::new().unwrap();
    write_fragment(
        ws.path(),
        "required.md",
        "category: general\nrequired: true\n",
        "# Version one\n\nFirst.",
    );
    let context = DevContext::default();
    generator::generate(ws.path(), &context, None).unwrap();

    // Change the corpus and regenerate.
    write_fragment(
        ws.path(),
        "required.md",
        "category: general\nrequired: true\n",
        "# Version two\n\nSecond.",
    );
    generator::generate(ws.path(), &context, None).unwrap();

    let before_rollback = history::list(ws.path(), None).unwrap().len();
    assert_eq!(before_rollback, 2);

    history::rollback(ws.path(), EntryKey::Index(1)).unwrap();

    let instructions =
        fs::read_to_string(ws.path().join(".github").join("copilot-instructions.md")).unwrap();
    assert!(instructions.contains("Version one"));

    let after_rollback = history::list(ws.path(), None).unwrap().len();
    assert_eq!(after_rollback, before_rollback, "rollback must not record a new history entry");
}

#[test]
fn cleanup_retains_recent_entries_only() {
    let ws = TempDir::new().unwrap();
    write_fragment(ws.path(), "a.md", "category: general\nrequired: true\n", "# A\n\nbody");
    generator::generate(ws.path(), &DevContext::default(), None).unwrap();

    let removed = history::cleanup(ws.path(), 30).unwrap();
    assert_eq!(removed, 0, "a freshly written entry must not be cleaned up");
}

#[test]
fn scoring_rules_default_when_file_absent() {
    let ws = TempDir::new().unwrap();
    let rules = fragments::ScoringRules::load(ws.path()).unwrap();
    assert_eq!(rules.max_sections, fragments::ScoringRules::default().max_sections);
}
