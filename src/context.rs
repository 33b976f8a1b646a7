//! Development Context state: the phase/focus/priority/mode record that
//! drives fragment scoring. Persisted as JSON with default fallbacks, saved
//! atomically via write-then-rename.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{CoreError, CoreResult};
use crate::paths;
use crate::restricted;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Development,
    Refactoring,
    Testing,
    Debugging,
    Documentation,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Development
    }
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Development => "development",
            Phase::Refactoring => "refactoring",
            Phase::Testing => "testing",
            Phase::Debugging => "debugging",
            Phase::Documentation => "documentation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Normal,
    Strict,
    Experimental,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Normal
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevContext {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub focus: Vec<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub mode: Mode,
}

impl Default for DevContext {
    fn default() -> Self {
        DevContext {
            phase: Phase::Development,
            focus: Vec::new(),
            priority: Priority::Medium,
            mode: Mode::Normal,
        }
    }
}

/// Partial update merged onto the current record field by field; absent
/// fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct ContextPatch {
    pub phase: Option<Phase>,
    pub focus: Option<Vec<String>>,
    pub priority: Option<Priority>,
    pub mode: Option<Mode>,
}

fn load_raw(workspace: &Path) -> CoreResult<DevContext> {
    let path = paths::context_file(workspace);
    match std::fs::read_to_string(&path) {
        Ok(content) => serde_json::from_str(&content)
            .map_err(|e| CoreError::from(anyhow::anyhow!("failed to parse context.json: {e}"))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DevContext::default()),
        Err(e) => Err(CoreError::from(e)),
    }
}

fn save_raw(workspace: &Path, context: &DevContext) -> CoreResult<()> {
    let path = paths::context_file(workspace);
    let content = serde_json::to_string_pretty(context)
        .map_err(|e| CoreError::from(anyhow::anyhow!("failed to serialize context.json: {e}")))?;
    crate::fs_state::write_unconditional(&path, &content).map_err(CoreError::from)?;
    Ok(())
}

/// Returns defaults when the context file is absent.
pub fn read(workspace: &Path) -> CoreResult<DevContext> {
    load_raw(workspace)
}

/// Merges `patch` onto the current record, persists it, and, when
/// `auto_regenerate` is not explicitly `false`, triggers a full regeneration
/// with the new context.
pub fn update(
    workspace: &Path,
    patch: ContextPatch,
    auto_regenerate: Option<bool>,
) -> CoreResult<DevContext> {
    restricted::ensure_writable(workspace)?;

    let updated = crate::lock::with_lock(workspace, None, || {
        let mut current = load_raw(workspace)?;
        if let Some(phase) = patch.phase {
            current.phase = phase;
        }
        if let Some(focus) = patch.focus {
            current.focus = focus;
        }
        if let Some(priority) = patch.priority {
            current.priority = priority;
        }
        if let Some(mode) = patch.mode {
            current.mode = mode;
        }
        save_raw(workspace, &current)?;
        info!("context updated: phase={:?} mode={:?}", current.phase, current.mode);
        Ok(current)
    })?;

    if auto_regenerate != Some(false) {
        crate::generator::generate(workspace, &updated, None)?;
    }

    Ok(updated)
}

/// Restores the development context to its defaults.
pub fn reset(workspace: &Path) -> CoreResult<DevContext> {
    restricted::ensure_writable(workspace)?;
    crate::lock::with_lock(workspace, None, || {
        let defaults = DevContext::default();
        save_raw(workspace, &defaults)?;
        info!("context reset to defaults");
        Ok(defaults)
    })
}
