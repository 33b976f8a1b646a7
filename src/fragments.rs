//! Fragment corpus loading and the deterministic relevance scorer.
//!
//! Loading recursively scans the corpus directory; a fragment whose front
//! matter fails to parse is logged and skipped rather than failing the
//! whole load — the generator must tolerate a partially valid corpus.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::context::{DevContext, Phase, Priority};
use crate::error::CoreResult;
use crate::paths;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FrontMatter {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    #[serde(default)]
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub critical_feedback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_feedback_reason: Option<String>,
    #[serde(default)]
    pub copilot_essential: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copilot_essential_reason: Option<String>,
}

fn default_priority() -> Priority {
    Priority::Low
}

#[derive(Debug, Clone)]
pub struct Fragment {
    /// Relative path from the corpus root; serves as the fragment's identity.
    pub path: String,
    pub front_matter: FrontMatter,
    pub body: String,
}

impl Fragment {
    /// First `# ` heading in the body, else the filename stem — used both by
    /// the scorer's `filePathMatch`/`todoKeywordMatch` checks and by the
    /// generator's `## <category>: <title>` section heading.
    pub fn title(&self) -> String {
        for line in self.body.lines() {
            if let Some(rest) = line.strip_prefix("# ") {
                return rest.trim().to_string();
            }
        }
        Path::new(&self.path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.path)
            .to_string()
    }

    fn first_paragraph(&self) -> &str {
        self.body.split("\n\n").next().unwrap_or("")
    }
}

/// Splits `---\n<yaml>\n---\n<body>` front matter. Returns `None` when the
/// file has no leading `---` block at all (treated as a parse failure by
/// the caller, which logs and skips).
pub(crate) fn split_front_matter(content: &str) -> Option<(&str, &str)> {
    if !content.starts_with("---") {
        return None;
    }
    let marker = regex::Regex::new(r"(?m)^---\s*$").unwrap();
    let mut matches = marker.find_iter(content);
    let first = matches.next()?;
    if first.start() != 0 {
        return None;
    }
    let second = matches.next()?;
    let yaml = &content[(first.end() + 1).min(content.len())..second.start()];
    let body = content[second.end()..].strip_prefix('\n').unwrap_or(&content[second.end()..]);
    Some((yaml, body))
}

fn parse_fragment(path: &str, content: &str) -> anyhow::Result<Fragment> {
    let (yaml, body) = split_front_matter(content)
        .ok_or_else(|| anyhow::anyhow!("no YAML front matter block"))?;
    let front_matter: FrontMatter =
        serde_yaml::from_str(yaml).map_err(|e| anyhow::anyhow!("invalid front matter: {e}"))?;
    Ok(Fragment {
        path: path.to_string(),
        front_matter,
        body: body.to_string(),
    })
}

const SKIP_DIRS: &[&str] = &["_templates", "tools"];

fn walk(dir: &Path, root: &Path, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if SKIP_DIRS.contains(&name) {
                continue;
            }
            walk(&path, root, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("md") {
            out.push(path);
        }
    }
    Ok(())
}

/// Scans the corpus recursively; fragments whose front matter fails to
/// parse are logged and skipped rather than aborting the load.
pub fn load_corpus(workspace: &Path) -> CoreResult<Vec<Fragment>> {
    let root = paths::corpus_dir(workspace);
    let mut files = Vec::new();
    walk(&root, &root, &mut files).map_err(crate::error::CoreError::from)?;
    files.sort();

    let mut fragments = Vec::with_capacity(files.len());
    for file in files {
        let relative = file
            .strip_prefix(&root)
            .unwrap_or(&file)
            .to_string_lossy()
            .replace('\\', "/");
        let content = match std::fs::read_to_string(&file) {
            Ok(c) => c,
            Err(e) => {
                warn!("skipping fragment {relative}: failed to read ({e})");
                continue;
            }
        };
        match parse_fragment(&relative, &content) {
            Ok(fragment) => fragments.push(fragment),
            Err(e) => warn!("skipping fragment {relative}: {e}"),
        }
    }
    Ok(fragments)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftHard {
    pub soft_limit: usize,
    pub hard_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityFlagLimits {
    pub critical_feedback: SoftHard,
    pub copilot_essential: SoftHard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringRules {
    pub todo_keyword_match: i64,
    pub tag_match: i64,
    pub phase_match: i64,
    pub file_path_match: i64,
    pub priority_high: i64,
    pub priority_medium: i64,
    pub required: i64,
    pub critical_feedback: i64,
    pub copilot_essential: i64,
    pub max_sections: usize,
    pub max_items_per_section: usize,
    pub priority_flags: PriorityFlagLimits,
}

impl Default for ScoringRules {
    fn default() -> Self {
        ScoringRules {
            todo_keyword_match: 5,
            tag_match: 3,
            phase_match: 4,
            file_path_match: 2,
            priority_high: 6,
            priority_medium: 3,
            required: 1_000_000,
            critical_feedback: 20,
            copilot_essential: 15,
            max_sections: 12,
            max_items_per_section: 10,
            priority_flags: PriorityFlagLimits {
                critical_feedback: SoftHard { soft_limit: 3, hard_limit: 5 },
                copilot_essential: SoftHard { soft_limit: 3, hard_limit: 5 },
            },
        }
    }
}

impl ScoringRules {
    pub fn load(workspace: &Path) -> CoreResult<Self> {
        let path = paths::scoring_rules_file(workspace);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let rules: ScoringRules = serde_json::from_str(&content)
                    .map_err(|e| anyhow::anyhow!("failed to parse scoring-rules.json: {e}"))?;
                Ok(rules)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ScoringRules::default()),
            Err(e) => Err(crate::error::CoreError::from(anyhow::Error::from(e))),
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Computes a fragment's relevance score against the current development
/// context: flag bonuses, focus/tag/phase/path matches, and priority weight.
pub fn score(fragment: &Fragment, context: &DevContext, rules: &ScoringRules) -> i64 {
    let fm = &fragment.front_matter;
    let mut total: i64 = 0;

    if fm.required {
        total += rules.required;
    }
    if fm.critical_feedback {
        total += rules.critical_feedback;
    }
    if fm.copilot_essential {
        total += rules.copilot_essential;
    }

    let title = fragment.title();
    let first_paragraph = fragment.first_paragraph();
    for focus in &context.focus {
        let hits = fm.tags.iter().any(|t| contains_ci(t, focus))
            || contains_ci(&fm.category, focus)
            || contains_ci(&title, focus)
            || contains_ci(first_paragraph, focus);
        if hits {
            total += rules.todo_keyword_match;
        }
    }

    let mut context_tags: HashSet<String> = context
        .focus
        .iter()
        .map(|f| f.to_lowercase())
        .collect();
    context_tags.insert(context.phase.as_str().to_lowercase());
    for tag in &fm.tags {
        if context_tags
            .iter()
            .any(|ct| contains_ci(tag, ct) || contains_ci(ct, tag))
        {
            total += rules.tag_match;
        }
    }

    if fm.phases.contains(&context.phase) {
        total += rules.phase_match;
    }

    let path_tokens: HashSet<String> = fragment
        .path
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect();
    let focus_shares_token = context
        .focus
        .iter()
        .any(|f| path_tokens.contains(&f.to_lowercase()));
    if focus_shares_token {
        total += rules.file_path_match;
    }

    total += match fm.priority {
        Priority::High => rules.priority_high,
        Priority::Medium => rules.priority_medium,
        Priority::Low => 0,
    };

    total
}

pub struct Scored {
    pub fragment: Fragment,
    pub score: i64,
}

/// Selects all mandatory fragments (path-sorted), followed by the
/// top-scoring optional fragments above the zero threshold, bounded by
/// `max_sections`.
pub fn select(fragments: Vec<Fragment>, context: &DevContext, rules: &ScoringRules) -> Vec<Scored> {
    let (mut mandatory, optional): (Vec<Fragment>, Vec<Fragment>) =
        fragments.into_iter().partition(|f| f.front_matter.required);
    mandatory.sort_by(|a, b| a.path.cmp(&b.path));

    let mut scored_optional: Vec<Scored> = optional
        .into_iter()
        .map(|f| {
            let s = score(&f, context, rules);
            Scored { fragment: f, score: s }
        })
        .collect();
    scored_optional.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.fragment.path.cmp(&b.fragment.path)));

    let budget = rules.max_sections.saturating_sub(mandatory.len());
    const THRESHOLD: i64 = 0;
    let chosen_optional: Vec<Scored> = scored_optional
        .into_iter()
        .filter(|s| s.score > THRESHOLD)
        .take(budget)
        .collect();

    let mut result: Vec<Scored> = mandatory
        .into_iter()
        .map(|f| Scored { score: i64::MAX, fragment: f })
        .collect();
    result.extend(chosen_optional);
    result
}
