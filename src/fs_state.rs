//! Content-addressed file state: SHA-256 hashing, hash-gated writes for
//! optimistic concurrency, and unconditional writes for the generator.
//! Every write goes through write-then-rename so a crash mid-write never
//! leaves a half-written file at the canonical path.

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::vcs::{self, VcsInfo};

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// A tiny hex encoder so we don't pull in the `hex` crate for one call site
/// per file; kept private to this module.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        let bytes = bytes.as_ref();
        let mut s = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            s.push_str(&format!("{b:02x}"));
        }
        s
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileState {
    pub path: String,
    pub hash: String,
    pub mtime_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcs: Option<VcsInfo>,
}

/// Reads a file's content along with its content-addressed state. Errors if
/// the file is absent; the instructions file has a separate graceful-empty
/// read path for its first-run case — see `sections::read_sections`.
pub fn read_with_state(
    path: &Path,
    include_vcs: bool,
) -> Result<(String, FileState)> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("file not found: {}", path.display()))?;
    let state = file_state(path, &body, include_vcs)?;
    Ok((body, state))
}

fn file_state(path: &Path, body: &str, include_vcs: bool) -> Result<FileState> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("failed to stat {}", path.display()))?;
    let mtime_ms = metadata
        .modified()
        .with_context(|| format!("failed to read mtime for {}", path.display()))?
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64;

    let vcs = if include_vcs {
        vcs::probe(path).unwrap_or(None)
    } else {
        None
    };

    Ok(FileState {
        path: path.display().to_string(),
        hash: sha256_hex(body.as_bytes()),
        mtime_ms,
        vcs,
    })
}

pub struct WriteConflict {
    pub expected_hash: String,
    pub current_hash: String,
}

pub enum WriteOutcome {
    Written(FileState),
    Conflict(WriteConflict),
}

/// `writeWithExpected` — re-reads current state; writes only if its hash
/// still matches `expected_hash`. Creates parent directories on demand.
pub fn write_with_expected(
    path: &Path,
    content: &str,
    expected_hash: &str,
) -> Result<WriteOutcome> {
    if let Ok(current) = std::fs::read_to_string(path) {
        let current_hash = sha256_hex(current.as_bytes());
        if current_hash != expected_hash {
            return Ok(WriteOutcome::Conflict(WriteConflict {
                expected_hash: expected_hash.to_string(),
                current_hash,
            }));
        }
    } else if !expected_hash.is_empty() {
        // File vanished between read and write — the expectation of "it
        // still has this hash" can never hold again.
        return Ok(WriteOutcome::Conflict(WriteConflict {
            expected_hash: expected_hash.to_string(),
            current_hash: String::new(),
        }));
    }

    atomic_write(path, content)?;
    let state = file_state(path, content, false)?;
    Ok(WriteOutcome::Written(state))
}

/// `writeUnconditional` — unchecked overwrite. Used only by the instruction
/// generator (`generator.rs`), which has its own locking and history
/// snapshotting for safety.
pub fn write_unconditional(path: &Path, content: &str) -> Result<FileState> {
    atomic_write(path, content)?;
    file_state(path, content, false)
}

/// Write-then-rename: write to a sibling `.tmp` path, then rename over the
/// target.
fn atomic_write(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent dir for {}", path.display()))?;
    }
    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, content)
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to atomically replace {}", path.display()))?;
    Ok(())
}
