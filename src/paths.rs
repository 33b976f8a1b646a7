//! Canonical filesystem layout, relative to the workspace root.

use std::path::{Path, PathBuf};

pub fn instructions_file(workspace: &Path) -> PathBuf {
    workspace.join(".github").join("copilot-instructions.md")
}

pub fn corpus_dir(workspace: &Path) -> PathBuf {
    workspace.join(".copilot-instructions")
}

pub fn state_dir(workspace: &Path) -> PathBuf {
    workspace.join(".copilot-state")
}

pub fn context_file(workspace: &Path) -> PathBuf {
    state_dir(workspace).join("context.json")
}

pub fn scoring_rules_file(workspace: &Path) -> PathBuf {
    state_dir(workspace).join("scoring-rules.json")
}

pub fn history_dir(workspace: &Path) -> PathBuf {
    state_dir(workspace).join("history")
}

pub fn lock_file(workspace: &Path) -> PathBuf {
    state_dir(workspace).join(".lock")
}

pub fn restricted_flag(workspace: &Path) -> PathBuf {
    state_dir(workspace).join("restricted.flag")
}
