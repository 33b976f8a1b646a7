//! Fragment corpus loading and the deterministic relevance scorer.

use copilot_memory::context::{DevContext, Phase, Priority};
use copilot_memory::fragments::{self, ScoringRules};
use std::fs;
use tempfile::TempDir;

fn write_fragment(ws: &std::path::Path, rel: &str, front_matter: &str, body: &str) {
    let path = ws.join(".copilot-instructions").join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, format!("---\n{front_matter}---\n{body}")).unwrap();
}

#[test]
fn load_corpus_skips_unparsable_fragments() {
    let ws = TempDir::new().unwrap();
    write_fragment(
        ws.path(),
        "general/good.md",
        "category: general\ntags: [rust]\n",
        "# Good fragment\n\nBody text.",
    );
    fs::create_dir_all(ws.path().join(".copilot-instructions/general")).unwrap();
    fs::write(
        ws.path().join(".copilot-instructions/general/bad.md"),
        "no front matter here at all",
    )
    .unwrap();

    let corpus = fragments::load_corpus(ws.path()).unwrap();
    assert_eq!(corpus.len(), 1);
    assert_eq!(corpus[0].path, "general/good.md");
}

#[test]
fn load_corpus_skips_template_and_tool_dirs() {
    let ws = TempDir::new().unwrap();
    write_fragment(ws.path(), "real/one.md", "category: general\n", "# One\n\nbody");
    write_fragment(ws.path(), "_templates/skip.md", "category: general\n", "# Skip\n\nbody");
    write_fragment(ws.path(), "tools/skip2.md", "category: general\n", "# Skip2\n\nbody");

    let corpus = fragments::load_corpus(ws.path()).unwrap();
    assert_eq!(corpus.len(), 1);
    assert_eq!(corpus[0].path, "real/one.md");
}

#[test]
fn required_fragment_always_outscores_optional_ones() {
    let ws = TempDir::new().unwrap();
    write_fragment(
        ws.path(),
        "required.md",
        "category: general\nrequired: true\n",
        "# Required\n\nAlways included.",
    );
    write_fragment(
        ws.path(),
        "optional.md",
        "category: general\npriority: high\n",
        "# Optional\n\nHigh priority but not required.",
    );

    let corpus = fragments::load_corpus(ws.path()).unwrap();
    let context = DevContext::default();
    let rules = ScoringRules::default();
    let selected = fragments::select(corpus, &context, &rules);

    assert_eq!(selected[0].fragment.path, "required.md");
}

#[test]
fn tag_and_phase_matches_score_higher_than_unrelated() {
    let ws = TempDir::new().unwrap();
    write_fragment(
        ws.path(),
        "relevant.md",
        "category: general\ntags: [auth]\nphases: [debugging]\n",
        "# Auth debugging\n\nHelp with auth bugs.",
    );
    write_fragment(
        ws.path(),
        "unrelated.md",
        "category: general\ntags: [docs]\n",
        "# Docs\n\nUnrelated fragment.",
    );

    let corpus = fragments::load_corpus(ws.path()).unwrap();
    let context = DevContext {
        phase: Phase::Debugging,
        focus: vec!["auth".to_string()],
        priority: Priority::Medium,
        mode: Default::default(),
    };
    let rules = ScoringRules::default();

    let relevant = corpus.iter().find(|f| f.path == "relevant.md").unwrap();
    let unrelated = corpus.iter().find(|f| f.path == "unrelated.md").unwrap();
    assert!(fragments::score(relevant, &context, &rules) > fragments::score(unrelated, &context, &rules));
}

#[test]
fn selection_is_bounded_by_max_sections() {
    let ws = TempDir::new().unwrap();
    for i in 0..20 {
        write_fragment(
            ws.path(),
            &format!("frag{i}.md"),
            "category: general\npriority: high\n",
            &format!("# Fragment {i}\n\nbody"),
        );
    }
    let corpus = fragments::load_corpus(ws.path()).unwrap();
    let context = DevContext::default();
    let mut rules = ScoringRules::default();
    rules.max_sections = 5;

    let selected = fragments::select(corpus, &context, &rules);
    assert_eq!(selected.len(), 5);
}
