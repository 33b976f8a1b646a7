//! Read-only VCS metadata probe feeding `FileState.vcs`. The core never
//! writes to git. The VCS executable is detected once per process and the
//! result cached; a missing `git` binary degrades gracefully rather than
//! failing the read.

use serde::Serialize;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VcsInfo {
    pub vcs_managed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcs_commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcs_status: Option<String>,
}

fn git_available() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    })
}

fn run_git(repo_dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Returns `Ok(None)` when no VCS is available (degraded mode), never an
/// error — a missing `git` binary is not a failure of the file-state read.
pub fn probe(path: &Path) -> anyhow::Result<Option<VcsInfo>> {
    if !git_available() {
        return Ok(None);
    }
    let dir = path.parent().unwrap_or(Path::new("."));

    let managed = run_git(dir, &["rev-parse", "--is-inside-work-tree"])
        .map(|s| s == "true")
        .unwrap_or(false);
    if !managed {
        return Ok(Some(VcsInfo {
            vcs_managed: false,
            vcs_commit: None,
            vcs_status: None,
        }));
    }

    let commit = run_git(dir, &["rev-parse", "HEAD"]);
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let status = run_git(dir, &["status", "--porcelain", "--", file_name]);

    Ok(Some(VcsInfo {
        vcs_managed: true,
        vcs_commit: commit,
        vcs_status: status,
    }))
}
