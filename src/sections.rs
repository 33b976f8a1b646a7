//! Section store: text-level, regex-anchored parsing of `^## ` boundaries —
//! never a Markdown AST rewrite, so injected conflict markers survive
//! round-trips byte-perfectly.

use anyhow::Context as _;
use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::error::{CoreError, CoreResult};
use crate::fs_state::{self, sha256_hex};
use crate::paths;
use crate::restricted;

const DEFAULT_TITLE: &str = "# Copilot Instructions\n\n";

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^## (.*)$").unwrap())
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Section {
    pub heading: String,
    pub body: String,
    pub hash: String,
}

#[derive(Debug, Clone)]
pub struct SectionSnapshot {
    pub heading: String,
    pub hash: String,
}

pub fn to_snapshot(sections: &[Section]) -> Vec<SectionSnapshot> {
    sections
        .iter()
        .map(|s| SectionSnapshot {
            heading: s.heading.clone(),
            hash: s.hash.clone(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position<'a> {
    First,
    Last,
    Before(&'a str),
    After(&'a str),
}

#[derive(Debug, Serialize)]
pub struct UpdateOutcome {
    pub success: bool,
    pub auto_merged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<String>,
}

/// Parses `content` into `(preamble, sections)`. The preamble is everything
/// before the first `## ` heading (normally the `# Title` line and its
/// trailing blank line), preserved verbatim.
pub(crate) fn parse(content: &str) -> anyhow::Result<(String, Vec<Section>)> {
    let re = heading_re();
    let matches: Vec<_> = re.captures_iter(content).collect();

    if matches.is_empty() {
        return Ok((content.to_string(), Vec::new()));
    }

    let first_start = matches[0].get(0).unwrap().start();
    let preamble = content[..first_start].to_string();

    let mut sections = Vec::with_capacity(matches.len());
    let mut seen = std::collections::HashSet::new();

    for (i, cap) in matches.iter().enumerate() {
        let full = cap.get(0).unwrap();
        let heading = cap[1].trim().to_string();
        if !seen.insert(heading.clone()) {
            anyhow::bail!("duplicate heading in instructions file: {heading}");
        }

        let body_start = (full.end() + 1).min(content.len()); // skip the newline ending the heading line
        let body_end = matches
            .get(i + 1)
            .map(|m| m.get(0).unwrap().start())
            .unwrap_or(content.len())
            .max(body_start);

        let raw_tail = &content[body_start..body_end];
        let body = raw_tail
            .strip_prefix('\n')
            .unwrap_or(raw_tail)
            .trim_end_matches('\n')
            .to_string();
        let hash = sha256_hex(body.as_bytes());

        sections.push(Section { heading, body, hash });
    }

    Ok((preamble, sections))
}

pub(crate) fn serialize(preamble: &str, sections: &[Section]) -> String {
    let mut out = preamble.to_string();
    for section in sections {
        out.push_str("## ");
        out.push_str(&section.heading);
        out.push_str("\n\n");
        out.push_str(&section.body);
        out.push('\n');
    }
    out
}

fn current_hash_or_empty(path: &Path) -> String {
    std::fs::read_to_string(path)
        .map(|s| sha256_hex(s.as_bytes()))
        .unwrap_or_default()
}

fn read_raw(workspace: &Path) -> anyhow::Result<String> {
    let path = paths::instructions_file(workspace);
    match std::fs::read_to_string(&path) {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// Returns an empty sequence if the instructions file is absent. This is
/// the one read path where absence is not an error — a workspace with no
/// instructions file yet is a normal starting state, not a fault.
pub fn read_sections(workspace: &Path) -> CoreResult<Vec<Section>> {
    let content = read_raw(workspace)?;
    let (_preamble, sections) = parse(&content)?;
    Ok(sections)
}

fn write_sections(
    workspace: &Path,
    preamble: &str,
    sections: &[Section],
    expected_hash: &str,
) -> CoreResult<()> {
    let path = paths::instructions_file(workspace);
    let new_content = serialize(preamble, sections);
    match fs_state::write_with_expected(&path, &new_content, expected_hash)
        .map_err(CoreError::from)?
    {
        fs_state::WriteOutcome::Written(_) => Ok(()),
        fs_state::WriteOutcome::Conflict(c) => Err(CoreError::Conflict(format!(
            "instructions file changed concurrently (expected {}, found {})",
            c.expected_hash, c.current_hash
        ))),
    }
}

fn conflict_block(external_body: &str, local_body: &str) -> String {
    format!(
        "<<<<<<< HEAD (external change: {})\n{}\n=======\n{}\n>>>>>>> MCP Update (local)",
        Utc::now().to_rfc3339(),
        external_body,
        local_body
    )
}

/// Updates a section's body, detecting concurrent external edits via a
/// snapshot of section hashes taken when the caller last read the file. A
/// heading that changed externally gets conflict markers spliced into its
/// body instead of a silent overwrite. `_expected_full_hash` is accepted for
/// API symmetry with the read side but plays no role in the comparison:
/// externally-changed detection runs off `initial_snapshot` alone, and the
/// write itself is always gated on the freshly re-read full-file hash.
pub fn update_section(
    workspace: &Path,
    heading: &str,
    new_body: &str,
    _expected_full_hash: Option<&str>,
    initial_snapshot: Option<&[SectionSnapshot]>,
) -> CoreResult<UpdateOutcome> {
    restricted::ensure_writable(workspace)?;

    crate::lock::with_lock(workspace, None, || {
        let path = paths::instructions_file(workspace);
        let content = read_raw(workspace)?;
        let current_full_hash = sha256_hex(content.as_bytes());
        let (preamble, mut sections) = parse(&content)?;

        // externally_changed is computed from initial_snapshot alone:
        // expected_full_hash is an optional extra hint from the caller, not
        // a prerequisite for detecting externally changed sections.
        let externally_changed: std::collections::HashSet<String> =
            if let Some(snapshot) = initial_snapshot {
                let current_by_heading: std::collections::HashMap<&str, &str> = sections
                    .iter()
                    .map(|s| (s.heading.as_str(), s.hash.as_str()))
                    .collect();
                snapshot
                    .iter()
                    .filter(|s| current_by_heading.get(s.heading.as_str()) != Some(&s.hash.as_str()))
                    .map(|s| s.heading.clone())
                    .collect()
            } else {
                std::collections::HashSet::new()
            };

        let auto_merged = !externally_changed.is_empty() && !externally_changed.contains(heading);

        if externally_changed.contains(heading) {
            let idx = sections.iter().position(|s| s.heading == heading);
            let external_body = idx.map(|i| sections[i].body.clone()).unwrap_or_default();
            let merged_body = conflict_block(&external_body, new_body);
            let merged_hash = sha256_hex(merged_body.as_bytes());

            match idx {
                Some(i) => {
                    sections[i].body = merged_body;
                    sections[i].hash = merged_hash;
                }
                None => sections.push(Section {
                    heading: heading.to_string(),
                    body: merged_body,
                    hash: merged_hash,
                }),
            }

            write_sections(workspace, &preamble, &sections, &current_full_hash)?;
            warn!("conflict markers inserted in section {heading}");
            return Ok(UpdateOutcome {
                success: false,
                auto_merged: false,
                conflict: Some(format!("Conflict markers inserted in section {heading}")),
            });
        }

        match sections.iter().position(|s| s.heading == heading) {
            Some(i) => {
                sections[i].body = new_body.trim_end_matches('\n').to_string();
                sections[i].hash = sha256_hex(sections[i].body.as_bytes());
            }
            None => {
                sections.push(Section {
                    heading: heading.to_string(),
                    body: new_body.trim_end_matches('\n').to_string(),
                    hash: sha256_hex(new_body.trim_end_matches('\n').as_bytes()),
                });
            }
        }

        let preamble = if preamble.is_empty() {
            DEFAULT_TITLE.to_string()
        } else {
            preamble
        };

        write_sections(workspace, &preamble, &sections, &current_full_hash)?;
        info!("updated section {heading} in {}", path.display());

        Ok(UpdateOutcome {
            success: true,
            auto_merged,
            conflict: None,
        })
    })
}

/// Inserts a new section at a position relative to the existing ones.
pub fn insert_section(
    workspace: &Path,
    heading: &str,
    body: &str,
    position: Position<'_>,
) -> CoreResult<()> {
    restricted::ensure_writable(workspace)?;

    crate::lock::with_lock(workspace, None, || {
        let content = read_raw(workspace)?;
        let current_hash = current_hash_or_empty(&paths::instructions_file(workspace));
        let (preamble, mut sections) = parse(&content)?;
        let preamble = if preamble.is_empty() {
            DEFAULT_TITLE.to_string()
        } else {
            preamble
        };

        if sections.iter().any(|s| s.heading == heading) {
            return Err(CoreError::DuplicateHeading(heading.to_string()));
        }

        let index = match position {
            Position::First => 0,
            Position::Last => sections.len(),
            Position::Before(anchor) => sections
                .iter()
                .position(|s| s.heading == anchor)
                .ok_or_else(|| CoreError::AnchorNotFound(anchor.to_string()))?,
            Position::After(anchor) => {
                let i = sections
                    .iter()
                    .position(|s| s.heading == anchor)
                    .ok_or_else(|| CoreError::AnchorNotFound(anchor.to_string()))?;
                i + 1
            }
        };

        let body = body.trim_end_matches('\n').to_string();
        let hash = sha256_hex(body.as_bytes());
        sections.insert(index, Section { heading: heading.to_string(), body, hash });

        write_sections(workspace, &preamble, &sections, &current_hash)?;
        info!("inserted section {heading}");
        Ok(())
    })
}

/// Removes a section by heading.
pub fn delete_section(workspace: &Path, heading: &str) -> CoreResult<()> {
    restricted::ensure_writable(workspace)?;

    crate::lock::with_lock(workspace, None, || {
        let content = read_raw(workspace)?;
        let current_hash = current_hash_or_empty(&paths::instructions_file(workspace));
        let (preamble, mut sections) = parse(&content)?;

        let idx = sections
            .iter()
            .position(|s| s.heading == heading)
            .ok_or_else(|| CoreError::NotFound(heading.to_string()))?;
        sections.remove(idx);

        write_sections(workspace, &preamble, &sections, &current_hash)?;
        info!("deleted section {heading}");
        Ok(())
    })
}
