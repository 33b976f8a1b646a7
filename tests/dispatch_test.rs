//! The shared tool dispatcher, exercised the way both binaries call it.

use copilot_memory::dispatch::dispatch;
use serde_json::json;
use tempfile::TempDir;

#[test]
fn section_update_then_read_via_dispatch() {
    let ws = TempDir::new().unwrap();

    let update = dispatch(
        ws.path(),
        "section_update",
        &json!({ "heading": "Build", "content": "cargo build" }),
    );
    assert_eq!(update["success"], true);

    let read = dispatch(ws.path(), "section_read", &json!({}));
    assert_eq!(read["success"], true);
    assert_eq!(read["sections"][0]["heading"], "Build");
}

#[test]
fn unknown_tool_returns_an_error_envelope() {
    let ws = TempDir::new().unwrap();
    let result = dispatch(ws.path(), "no_such_tool", &json!({}));
    assert_eq!(result["success"], false);
    assert_eq!(result["error"], "NotFound");
}

#[test]
fn flags_add_past_hard_limit_surfaces_existing_flags() {
    let ws = TempDir::new().unwrap();
    for i in 0..5 {
        let path = ws
            .path()
            .join(".copilot-instructions")
            .join(format!("f{i}.md"));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "---\ncategory: general\n---\n# F\n\nbody").unwrap();
        let outcome = dispatch(
            ws.path(),
            "flags_add",
            &json!({ "filePath": format!("f{i}.md"), "flagType": "criticalFeedback" }),
        );
        assert_eq!(outcome["success"], true);
    }

    let overflow_path = ws.path().join(".copilot-instructions").join("overflow.md");
    std::fs::write(&overflow_path, "---\ncategory: general\n---\n# F\n\nbody").unwrap();
    let result = dispatch(
        ws.path(),
        "flags_add",
        &json!({ "filePath": "overflow.md", "flagType": "criticalFeedback" }),
    );
    assert_eq!(result["success"], false);
    assert_eq!(result["error"], "HardLimitReached");
    assert_eq!(result["existing_flags"].as_array().unwrap().len(), 5);
}

#[test]
fn context_update_regenerates_instructions_by_default() {
    let ws = TempDir::new().unwrap();
    let corpus_path = ws.path().join(".copilot-instructions").join("req.md");
    std::fs::create_dir_all(corpus_path.parent().unwrap()).unwrap();
    std::fs::write(&corpus_path, "---\ncategory: general\nrequired: true\n---\n# Req\n\nalways").unwrap();

    let result = dispatch(
        ws.path(),
        "context_update",
        &json!({ "state": { "phase": "debugging" } }),
    );
    assert_eq!(result["success"], true);
    assert_eq!(result["phase"], "debugging");

    let instructions = std::fs::read_to_string(
        ws.path().join(".github").join("copilot-instructions.md"),
    )
    .unwrap();
    assert!(instructions.contains("always"));
}
