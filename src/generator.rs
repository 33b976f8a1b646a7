//! Instruction generator: assembles the title, a templated
//! meta-instruction block, and the scored fragment selection, then writes
//! the instructions file unconditionally (the lock plus a history snapshot
//! provide safety — this is the only operation permitted to overwrite the
//! file wholesale).

use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::context::DevContext;
use crate::error::CoreResult;
use crate::fragments::{self, Scored};
use crate::history;
use crate::paths;

#[derive(Debug, Serialize)]
pub struct GenerateOutcome {
    pub success: bool,
    pub sections_count: usize,
    pub generated_hash: String,
}

fn meta_instruction_block(context: &DevContext) -> String {
    let focus_line = if context.focus.is_empty() {
        "no specific focus areas are currently declared".to_string()
    } else {
        format!("the current focus areas are: {}", context.focus.join(", "))
    };

    format!(
        "> **How to use this file.** You are operating in the **{phase}** phase \
         under **{mode}** mode with **{priority}** priority; {focus}. Treat each \
         section below as authoritative context for the repository it accompanies \
         — prefer it over assumptions from training data, but defer to explicit \
         instructions the human gives you in the current conversation. Sections \
         flagged as required or critical-feedback were force-included regardless \
         of their relevance score: do not skip or summarize them away. If a \
         section conflicts with another, prefer the more specific one (the one \
         naming a narrower file, module, or scenario). This file is regenerated \
         from a scored fragment corpus; edits made directly here may be \
         overwritten by the next generation unless they land inside a section \
         whose corpus fragment no longer exists, in which case they survive as \
         a local-only section. When in doubt about a missing capability, prefer \
         asking over guessing.\n",
        phase = context.phase.as_str(),
        mode = format!("{:?}", context.mode).to_lowercase(),
        priority = format!("{:?}", context.priority).to_lowercase(),
        focus = focus_line,
    )
}

fn render_fragment_section(scored: &Scored, max_items: usize) -> String {
    let fragment = &scored.fragment;
    let heading = format!("## {}: {}\n\n", fragment.front_matter.category, fragment.title());

    let body = &fragment.body;
    let is_pure_list = !body.trim().is_empty()
        && body
            .lines()
            .filter(|l| !l.trim().is_empty())
            .all(|l| {
                let t = l.trim_start();
                t.starts_with("- ") || t.starts_with("* ") || t.starts_with(char::is_numeric)
            });

    let rendered_body = if is_pure_list {
        let truncated: Vec<&str> = body
            .lines()
            .filter(|l| !l.trim().is_empty())
            .take(max_items)
            .collect();
        truncated.join("\n")
    } else {
        body.trim().to_string()
    };

    format!("{heading}{rendered_body}\n")
}

/// Scores and selects the corpus against `context`, renders the instructions
/// file, writes it unconditionally, and records a history entry.
pub fn generate(
    workspace: &Path,
    context: &DevContext,
    _options: Option<()>,
) -> CoreResult<GenerateOutcome> {
    crate::lock::with_lock(workspace, None, || {
        let rules = fragments::ScoringRules::load(workspace)?;
        let corpus = fragments::load_corpus(workspace)?;
        let selected = fragments::select(corpus, context, &rules);

        let mut output = String::from("# Copilot Instructions\n\n");
        output.push_str(&meta_instruction_block(context));
        output.push('\n');

        for scored in &selected {
            output.push('\n');
            output.push_str(&render_fragment_section(scored, rules.max_items_per_section));
        }

        let path = paths::instructions_file(workspace);
        let state = crate::fs_state::write_unconditional(&path, &output)
            .map_err(crate::error::CoreError::from)?;

        history::record(workspace, context, &state.hash, selected.len(), &output)?;

        info!(
            "generated instructions file with {} section(s), hash {}",
            selected.len(),
            state.hash
        );

        Ok(GenerateOutcome {
            success: true,
            sections_count: selected.len(),
            generated_hash: state.hash,
        })
    })
}
