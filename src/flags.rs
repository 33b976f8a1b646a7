//! Priority-flag registry: `criticalFeedback` and `copilotEssential`
//! markers on corpus fragments, each capped by a soft and a hard limit.
//! Rewrites replace only the YAML front-matter block; the body is left
//! byte-for-byte untouched.

use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{CoreError, CoreResult};
use crate::fragments::{self, Fragment};
use crate::paths;
use crate::restricted;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    CriticalFeedback,
    CopilotEssential,
}

impl FlagKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "criticalFeedback" => Some(FlagKind::CriticalFeedback),
            "copilotEssential" => Some(FlagKind::CopilotEssential),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FlagKind::CriticalFeedback => "criticalFeedback",
            FlagKind::CopilotEssential => "copilotEssential",
        }
    }

    fn is_set(&self, fragment: &Fragment) -> bool {
        match self {
            FlagKind::CriticalFeedback => fragment.front_matter.critical_feedback,
            FlagKind::CopilotEssential => fragment.front_matter.copilot_essential,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FlagHolder {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AddOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub existing: Vec<FlagHolder>,
}

#[derive(Debug, Serialize)]
pub enum FlagStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "warning")]
    Warning,
    #[serde(rename = "error")]
    Error,
}

#[derive(Debug, Serialize)]
pub struct FlagKindStatus {
    pub count: usize,
    pub soft_limit: usize,
    pub hard_limit: usize,
    pub status: FlagStatus,
    pub holders: Vec<FlagHolder>,
}

#[derive(Debug, Default, Serialize)]
pub struct ListResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical_feedback: Option<FlagKindStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copilot_essential: Option<FlagKindStatus>,
}

fn holders_for(fragments: &[Fragment], kind: FlagKind) -> Vec<FlagHolder> {
    fragments
        .iter()
        .filter(|f| kind.is_set(f))
        .map(|f| FlagHolder {
            path: f.path.clone(),
            reason: match kind {
                FlagKind::CriticalFeedback => f.front_matter.critical_feedback_reason.clone(),
                FlagKind::CopilotEssential => f.front_matter.copilot_essential_reason.clone(),
            },
        })
        .collect()
}

fn kind_status(fragments: &[Fragment], kind: FlagKind, limits: &fragments::SoftHard) -> FlagKindStatus {
    let holders = holders_for(fragments, kind);
    let count = holders.len();
    let status = if count >= limits.hard_limit {
        FlagStatus::Error
    } else if count >= limits.soft_limit {
        FlagStatus::Warning
    } else {
        FlagStatus::Ok
    };
    FlagKindStatus {
        count,
        soft_limit: limits.soft_limit,
        hard_limit: limits.hard_limit,
        status,
        holders,
    }
}

/// Reports counts, limits, and holders for one flag kind, or both when
/// `filter` is `None`.
pub fn list(workspace: &Path, filter: Option<FlagKind>) -> CoreResult<ListResult> {
    let corpus = fragments::load_corpus(workspace)?;
    let rules = fragments::ScoringRules::load(workspace)?;

    let mut result = ListResult::default();
    if filter.is_none() || filter == Some(FlagKind::CriticalFeedback) {
        result.critical_feedback = Some(kind_status(
            &corpus,
            FlagKind::CriticalFeedback,
            &rules.priority_flags.critical_feedback,
        ));
    }
    if filter.is_none() || filter == Some(FlagKind::CopilotEssential) {
        result.copilot_essential = Some(kind_status(
            &corpus,
            FlagKind::CopilotEssential,
            &rules.priority_flags.copilot_essential,
        ));
    }
    Ok(result)
}

fn rewrite_front_matter(
    workspace: &Path,
    fragment_path: &str,
    mutate: impl FnOnce(&mut fragments::FrontMatter),
) -> CoreResult<()> {
    let full_path = paths::corpus_dir(workspace).join(fragment_path);
    let content = std::fs::read_to_string(&full_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CoreError::NotFound(fragment_path.to_string())
        } else {
            CoreError::from(e)
        }
    })?;
    let (yaml, body) = fragments::split_front_matter(&content)
        .ok_or_else(|| CoreError::NotFound(format!("{fragment_path} has no front matter")))?;
    let mut front_matter: fragments::FrontMatter = serde_yaml::from_str(yaml)
        .map_err(|e| CoreError::from(anyhow::anyhow!("invalid front matter in {fragment_path}: {e}")))?;

    mutate(&mut front_matter);

    let new_yaml = serde_yaml::to_string(&front_matter)
        .map_err(|e| CoreError::from(anyhow::anyhow!("failed to serialize front matter: {e}")))?;
    let new_content = format!("---\n{new_yaml}---\n{body}");
    crate::fs_state::write_unconditional(&full_path, &new_content).map_err(CoreError::from)?;
    Ok(())
}

/// Sets a priority flag on a fragment. A fragment that already carries the
/// flag does not count against its own cap — re-adding (e.g. to update the
/// reason) must not be blocked by the fragment's own prior flag.
pub fn add(
    workspace: &Path,
    fragment_path: &str,
    kind: FlagKind,
    reason: Option<&str>,
) -> CoreResult<AddOutcome> {
    restricted::ensure_writable(workspace)?;

    crate::lock::with_lock(workspace, None, || {
        let corpus = fragments::load_corpus(workspace)?;
        let rules = fragments::ScoringRules::load(workspace)?;
        let limits = match kind {
            FlagKind::CriticalFeedback => &rules.priority_flags.critical_feedback,
            FlagKind::CopilotEssential => &rules.priority_flags.copilot_essential,
        };

        if !corpus.iter().any(|f| f.path == fragment_path) {
            return Err(CoreError::NotFound(fragment_path.to_string()));
        }

        let existing_others: Vec<FlagHolder> = holders_for(&corpus, kind)
            .into_iter()
            .filter(|h| h.path != fragment_path)
            .collect();
        let count = existing_others.len();

        if count >= limits.hard_limit {
            warn!("hard limit reached for {} ({count} >= {})", kind.label(), limits.hard_limit);
            return Err(CoreError::HardLimitReached {
                kind: kind.label().to_string(),
                existing: existing_others,
            });
        }

        rewrite_front_matter(workspace, fragment_path, |fm| match kind {
            FlagKind::CriticalFeedback => {
                fm.critical_feedback = true;
                fm.critical_feedback_reason = reason.map(|s| s.to_string());
            }
            FlagKind::CopilotEssential => {
                fm.copilot_essential = true;
                fm.copilot_essential_reason = reason.map(|s| s.to_string());
            }
        })?;

        let mut holders_after = existing_others.clone();
        holders_after.push(FlagHolder {
            path: fragment_path.to_string(),
            reason: reason.map(|s| s.to_string()),
        });

        let warning = if count >= limits.soft_limit {
            warn!(
                "soft limit reached for {} ({} >= {})",
                kind.label(),
                count + 1,
                limits.soft_limit
            );
            Some(format!(
                "{} is at {} of {} (hard cap {}); consider reviewing existing flags",
                kind.label(),
                count + 1,
                limits.soft_limit,
                limits.hard_limit
            ))
        } else {
            None
        };

        info!("added {} flag to {fragment_path}", kind.label());
        Ok(AddOutcome {
            success: true,
            warning,
            existing: holders_after,
        })
    })
}

/// Clears a priority flag and its reason from a fragment.
pub fn remove(workspace: &Path, fragment_path: &str, kind: FlagKind) -> CoreResult<()> {
    restricted::ensure_writable(workspace)?;
    crate::lock::with_lock(workspace, None, || {
        rewrite_front_matter(workspace, fragment_path, |fm| match kind {
            FlagKind::CriticalFeedback => {
                fm.critical_feedback = false;
                fm.critical_feedback_reason = None;
            }
            FlagKind::CopilotEssential => {
                fm.copilot_essential = false;
                fm.copilot_essential_reason = None;
            }
        })?;
        info!("removed {} flag from {fragment_path}", kind.label());
        Ok(())
    })
}
