//! Process-wide advisory lock: a short-TTL mutual-exclusion primitive every
//! writer acquires and releases around its call, with stale-lock eviction
//! so a crashed holder can't wedge the workspace forever.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

use crate::error::{CoreError, CoreResult};

const POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_TIMEOUT_MS: u64 = 5_000;
const STALE_MULTIPLIER: u64 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    pub session_id: String,
    pub acquired_at: i64,
    pub pid: u32,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn session_id() -> String {
    format!("{}-{}", std::process::id(), now_ms())
}

struct Held {
    path: PathBuf,
    session_id: String,
}

impl Drop for Held {
    fn drop(&mut self) {
        // Only delete the lock if it still belongs to us — a lock re-
        // acquired by another owner after stale eviction must survive.
        if let Ok(content) = std::fs::read_to_string(&self.path) {
            if let Ok(record) = serde_json::from_str::<LockRecord>(&content) {
                if record.session_id == self.session_id {
                    let _ = std::fs::remove_file(&self.path);
                }
            }
        }
    }
}

fn try_acquire(path: &Path, timeout_ms: u64) -> Result<Option<Held>> {
    let mine = LockRecord {
        session_id: session_id(),
        acquired_at: now_ms(),
        pid: std::process::id(),
    };
    let serialized = serde_json::to_string(&mine).context("failed to serialize lock record")?;

    match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(mut file) => {
            use std::io::Write;
            file.write_all(serialized.as_bytes())
                .context("failed to write lock record")?;
            return Ok(Some(Held {
                path: path.to_path_buf(),
                session_id: mine.session_id,
            }));
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e).context("failed to create lock file"),
    }

    // Lock exists — check staleness.
    let existing = std::fs::read_to_string(path).ok();
    let existing_record: Option<LockRecord> =
        existing.and_then(|c| serde_json::from_str(&c).ok());

    if let Some(record) = existing_record {
        let age_ms = now_ms() - record.acquired_at;
        if age_ms > (STALE_MULTIPLIER * timeout_ms) as i64 {
            warn!(
                "stale lock detected (age {}ms, owner pid {}) — evicting",
                age_ms, record.pid
            );
            let _ = std::fs::remove_file(path);
            // Retry immediately within this same poll iteration.
            return try_acquire(path, timeout_ms);
        }
    }

    Ok(None)
}

/// Acquires the process lock, runs `f`, then releases it. Polls every
/// 100ms; stale locks older than `2 * timeout_ms` are evicted and retried
/// in the same iteration.
pub fn with_lock<T>(
    workspace: &Path,
    timeout_ms: Option<u64>,
    f: impl FnOnce() -> CoreResult<T>,
) -> CoreResult<T> {
    let timeout_ms = timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
    let path = crate::paths::lock_file(workspace);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(CoreError::from)?;
    }

    let deadline = SystemTime::now() + Duration::from_millis(timeout_ms);
    loop {
        match try_acquire(&path, timeout_ms) {
            Ok(Some(held)) => {
                let result = f();
                drop(held);
                return result;
            }
            Ok(None) => {
                if SystemTime::now() >= deadline {
                    return Err(CoreError::LockTimeout(timeout_ms));
                }
                thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
            }
            Err(e) => return Err(CoreError::from(e)),
        }
    }
}
