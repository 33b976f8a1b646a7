//! History store: an append-only JSON snapshot per generation, with
//! listing, diffing, and rollback. Each entry is written with the same
//! write-then-rename atomicity as every other piece of managed state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::context::DevContext;
use crate::error::{CoreError, CoreResult};
use crate::fs_state;
use crate::paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub context: DevContext,
    pub hash: String,
    pub sections_count: usize,
    pub generated_content: String,
}

fn filename_timestamp(now: DateTime<Utc>) -> String {
    // YYYY-MM-DDTHH-mm-ss-sssZ,.
    format!("{}Z", now.format("%Y-%m-%dT%H-%M-%S-%3f"))
}

fn entry_filename(now: DateTime<Utc>, hash: &str) -> String {
    let hash8: String = hash.chars().take(8).collect();
    format!("{}-{}.json", filename_timestamp(now), hash8)
}

/// Appends a new history entry with a timestamp-prefixed filename.
pub fn record(
    workspace: &Path,
    context: &DevContext,
    hash: &str,
    sections_count: usize,
    generated_content: &str,
) -> CoreResult<()> {
    let now = Utc::now();
    let entry = HistoryEntry {
        timestamp: now.to_rfc3339(),
        context: context.clone(),
        hash: hash.to_string(),
        sections_count,
        generated_content: generated_content.to_string(),
    };

    let dir = paths::history_dir(workspace);
    let path = dir.join(entry_filename(now, hash));
    let content = serde_json::to_string_pretty(&entry)
        .map_err(|e| CoreError::from(anyhow::anyhow!("failed to serialize history entry: {e}")))?;

    // write-then-rename so a crash mid-write never leaves a partial entry.
    fs_state::write_unconditional(&path, &content).map_err(CoreError::from)?;
    Ok(())
}

fn list_files(workspace: &Path) -> CoreResult<Vec<PathBuf>> {
    let dir = paths::history_dir(workspace);
    let entries = match std::fs::read_dir(&dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CoreError::from(e)),
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    // Filenames are lexicographically sortable by timestamp; descending
    // order is newest-first.
    files.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
    Ok(files)
}

fn load_entry(path: &Path) -> CoreResult<HistoryEntry> {
    let content = std::fs::read_to_string(path).map_err(CoreError::from)?;
    serde_json::from_str(&content)
        .map_err(|e| CoreError::from(anyhow::anyhow!("failed to parse history entry: {e}")))
}

/// Lists entries newest-first, optionally bounded to the first `limit`.
pub fn list(workspace: &Path, limit: Option<usize>) -> CoreResult<Vec<HistoryEntry>> {
    let files = list_files(workspace)?;
    let take = limit.unwrap_or(files.len());
    files
        .into_iter()
        .take(take)
        .map(|p| load_entry(&p))
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub enum EntryKey<'a> {
    Index(usize),
    Timestamp(&'a str),
}

/// Looks up one entry, either by its position in the newest-first listing
/// or by its exact timestamp.
pub fn get(workspace: &Path, key: EntryKey<'_>) -> CoreResult<HistoryEntry> {
    let files = list_files(workspace)?;
    match key {
        EntryKey::Index(n) => {
            let path = files
                .get(n)
                .ok_or_else(|| CoreError::HistoryEntryNotFound(format!("index {n}")))?;
            load_entry(path)
        }
        EntryKey::Timestamp(ts) => {
            for path in &files {
                let entry = load_entry(path)?;
                if entry.timestamp == ts {
                    return Ok(entry);
                }
            }
            Err(CoreError::HistoryEntryNotFound(ts.to_string()))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryDiff {
    pub context_changes: serde_json::Value,
    pub sections_count_diff: i64,
    pub content_changed: bool,
}

/// Compares two entries' context and section count.
pub fn diff(workspace: &Path, from: EntryKey<'_>, to: EntryKey<'_>) -> CoreResult<HistoryDiff> {
    let from_entry = get(workspace, from)?;
    let to_entry = get(workspace, to)?;

    let context_changes = serde_json::json!({
        "from": from_entry.context,
        "to": to_entry.context,
    });

    Ok(HistoryDiff {
        context_changes,
        sections_count_diff: to_entry.sections_count as i64 - from_entry.sections_count as i64,
        content_changed: from_entry.hash != to_entry.hash,
    })
}

/// Restores the development context and writes the entry's generated
/// content unconditionally. Never recorded as a new history entry, to avoid
/// unbounded recursion on repeated rollbacks.
///
/// Only the output bytes and the context are restored, never the corpus —
/// an explicit decision, not an oversight; see DESIGN.md for the open
/// question this resolves.
pub fn rollback(workspace: &Path, key: EntryKey<'_>) -> CoreResult<HistoryEntry> {
    crate::restricted::ensure_writable(workspace)?;

    crate::lock::with_lock(workspace, None, || {
        let entry = get(workspace, key)?;

        let context_path = paths::context_file(workspace);
        let context_json = serde_json::to_string_pretty(&entry.context).map_err(|e| {
            CoreError::from(anyhow::anyhow!("failed to serialize restored context: {e}"))
        })?;
        fs_state::write_unconditional(&context_path, &context_json).map_err(CoreError::from)?;

        let instructions_path = paths::instructions_file(workspace);
        fs_state::write_unconditional(&instructions_path, &entry.generated_content)
            .map_err(CoreError::from)?;

        tracing::info!("rolled back to history entry {}", entry.timestamp);
        Ok(entry)
    })
}

/// `cleanup(daysToKeep)` — deletes entries strictly older than
/// `now - daysToKeep`.
pub fn cleanup(workspace: &Path, days_to_keep: i64) -> CoreResult<usize> {
    let cutoff = Utc::now() - chrono::Duration::days(days_to_keep);
    let files = list_files(workspace)?;
    let mut removed = 0;
    for path in files {
        let entry = match load_entry(&path) {
            Ok(e) => e,
            Err(_) => continue,
        };
        let ts: Option<DateTime<Utc>> = DateTime::parse_from_rfc3339(&entry.timestamp)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
        if let Some(ts) = ts {
            if ts < cutoff {
                std::fs::remove_file(&path).map_err(CoreError::from)?;
                removed += 1;
            }
        }
    }
    Ok(removed)
}
