//! Conflict detection and resolution for `<<<<<<< HEAD ... >>>>>>>` marker
//! blocks left by `sections::update_section`. Same text-level philosophy as
//! `sections.rs`: markers are found and replaced by literal substring
//! matching, never through a Markdown pretty-printer.

use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::OnceLock;
use tracing::info;

use crate::error::{CoreError, CoreResult};
use crate::fs_state::{self, sha256_hex};
use crate::paths;
use crate::restricted;
use crate::sections;

fn conflict_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?s)<<<<<<< HEAD \(external change: ([^)]*)\)\n(.*?)\n=======\n(.*?)\n>>>>>>> MCP Update \(local\)",
        )
        .unwrap()
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct Conflict {
    pub heading: String,
    pub external_timestamp: String,
    pub external_body: String,
    pub local_body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    UseExternal,
    UseLocal,
    UseManual,
}

impl Strategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "use-external" => Some(Strategy::UseExternal),
            "use-local" => Some(Strategy::UseLocal),
            "use-manual" => Some(Strategy::UseManual),
            _ => None,
        }
    }
}

fn heading_for_offset(content: &str, offset: usize) -> String {
    let re = Regex::new(r"(?m)^## (.*)$").unwrap();
    let mut last = String::new();
    for cap in re.captures_iter(content) {
        let m = cap.get(0).unwrap();
        if m.start() < offset {
            last = cap[1].trim().to_string();
        } else {
            break;
        }
    }
    last
}

/// Scans the whole instructions file for conflict marker blocks.
pub fn detect_conflicts(workspace: &Path) -> CoreResult<Vec<Conflict>> {
    let path = paths::instructions_file(workspace);
    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CoreError::from(e)),
    };

    let mut conflicts = Vec::new();
    for cap in conflict_re().captures_iter(&content) {
        let m = cap.get(0).unwrap();
        conflicts.push(Conflict {
            heading: heading_for_offset(&content, m.start()),
            external_timestamp: cap[1].to_string(),
            external_body: cap[2].to_string(),
            local_body: cap[3].to_string(),
        });
    }
    Ok(conflicts)
}

fn resolve_body(body: &str, strategy: Strategy, manual: Option<&str>) -> CoreResult<String> {
    let re = conflict_re();
    if !re.is_match(body) {
        return Err(CoreError::NotFound(
            "no conflict markers in this section".to_string(),
        ));
    }
    if strategy == Strategy::UseManual && manual.is_none() {
        return Err(CoreError::Conflict(
            "manualContent is required for use-manual resolution".to_string(),
        ));
    }

    let resolved = re.replace_all(body, |caps: &regex::Captures| match strategy {
        Strategy::UseExternal => caps[2].to_string(),
        Strategy::UseLocal => caps[3].to_string(),
        Strategy::UseManual => manual.unwrap_or_default().to_string(),
    });
    Ok(resolved.to_string())
}

/// Resolves the conflict markers in one section's body according to
/// `strategy`, replacing the section in place.
pub fn resolve_conflict(
    workspace: &Path,
    heading: &str,
    strategy: Strategy,
    manual_body: Option<&str>,
) -> CoreResult<()> {
    restricted::ensure_writable(workspace)?;

    crate::lock::with_lock(workspace, None, || {
        let path = paths::instructions_file(workspace);
        let content = std::fs::read_to_string(&path).map_err(CoreError::from)?;
        let current_hash = sha256_hex(content.as_bytes());

        let (preamble, mut all_sections) = sections::parse(&content).map_err(CoreError::from)?;
        let idx = all_sections
            .iter()
            .position(|s| s.heading == heading)
            .ok_or_else(|| CoreError::NotFound(heading.to_string()))?;

        let resolved_body = resolve_body(&all_sections[idx].body, strategy, manual_body)?;
        let resolved_body = resolved_body.trim_end_matches('\n').to_string();
        all_sections[idx].hash = sha256_hex(resolved_body.as_bytes());
        all_sections[idx].body = resolved_body;

        let new_content = sections::serialize(&preamble, &all_sections);
        match fs_state::write_with_expected(&path, &new_content, &current_hash)
            .map_err(CoreError::from)?
        {
            fs_state::WriteOutcome::Written(_) => {
                info!("resolved conflict in section {heading}");
                Ok(())
            }
            fs_state::WriteOutcome::Conflict(c) => Err(CoreError::Conflict(format!(
                "instructions file changed concurrently while resolving (expected {}, found {})",
                c.expected_hash, c.current_hash
            ))),
        }
    })
}
