use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use copilot_memory::dispatch::dispatch;

#[derive(Parser)]
#[command(name = "copilot-memory-cli", about = "Structured memory store for a repository's Copilot instructions file")]
struct Cli {
    /// Workspace root containing .github/copilot-instructions.md
    #[arg(long, global = true, default_value = ".")]
    workspace: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read all sections of the instructions file
    SectionRead,
    /// Update (or create) one section, with hash-based optimistic concurrency
    SectionUpdate {
        heading: String,
        content: String,
        #[arg(long)]
        expected_hash: Option<String>,
    },
    /// Delete a section by heading
    SectionDelete { heading: String },
    /// Insert a new section at a position relative to an existing heading
    SectionInsert {
        heading: String,
        content: String,
        #[arg(long, default_value = "last")]
        position: String,
        #[arg(long)]
        anchor: Option<String>,
    },
    /// List unresolved conflict-marker blocks
    DetectConflicts,
    /// Resolve a conflict block in one section
    ResolveConflict {
        heading: String,
        /// use-external | use-local | use-manual
        resolution: String,
        #[arg(long)]
        manual_content: Option<String>,
    },
    /// Read the current Development Context
    ContextRead,
    /// Patch the Development Context and regenerate (unless --no-regenerate)
    ContextUpdate {
        #[arg(long)]
        phase: Option<String>,
        #[arg(long)]
        focus: Vec<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        mode: Option<String>,
        #[arg(long)]
        no_regenerate: bool,
    },
    /// Reset the Development Context to defaults
    ContextReset,
    /// Roll back output + context to a prior history entry
    Rollback {
        /// History index (0 = newest) or an RFC3339 timestamp
        key: String,
    },
    /// List history entries, newest first
    HistoryList {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Diff two history entries
    HistoryDiff { from: String, to: String },
    /// Delete history entries older than N days
    HistoryCleanup {
        #[arg(long, default_value_t = 30)]
        days_to_keep: i64,
    },
    /// Flag a corpus fragment as criticalFeedback or copilotEssential
    FlagsAdd {
        file_path: String,
        /// criticalFeedback | copilotEssential
        flag_type: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Remove a priority flag from a corpus fragment
    FlagsRemove { file_path: String, flag_type: String },
    /// Report priority-flag counts against their soft/hard caps
    FlagsList {
        #[arg(long)]
        filter: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let workspace = cli.workspace.clone();

    let (tool, args) = match cli.command {
        Commands::SectionRead => ("section_read", serde_json::json!({})),
        Commands::SectionUpdate { heading, content, expected_hash } => (
            "section_update",
            serde_json::json!({ "heading": heading, "content": content, "expectedHash": expected_hash }),
        ),
        Commands::SectionDelete { heading } => {
            ("section_delete", serde_json::json!({ "heading": heading }))
        }
        Commands::SectionInsert { heading, content, position, anchor } => (
            "section_insert",
            serde_json::json!({
                "heading": heading, "content": content, "position": position, "anchor": anchor
            }),
        ),
        Commands::DetectConflicts => ("detect_conflicts", serde_json::json!({})),
        Commands::ResolveConflict { heading, resolution, manual_content } => (
            "resolve_conflict",
            serde_json::json!({
                "heading": heading, "resolution": resolution, "manualContent": manual_content
            }),
        ),
        Commands::ContextRead => ("context_read", serde_json::json!({})),
        Commands::ContextUpdate { phase, focus, priority, mode, no_regenerate } => (
            "context_update",
            serde_json::json!({
                "state": {
                    "phase": phase,
                    "focus": if focus.is_empty() { None } else { Some(focus) },
                    "priority": priority,
                    "mode": mode,
                },
                "autoRegenerate": !no_regenerate,
            }),
        ),
        Commands::ContextReset => ("context_reset", serde_json::json!({})),
        Commands::Rollback { key } => ("context_rollback", serde_json::json!({ "timestamp": key })),
        Commands::HistoryList { limit } => ("history_list", serde_json::json!({ "limit": limit })),
        Commands::HistoryDiff { from, to } => {
            ("history_diff", serde_json::json!({ "from": from, "to": to }))
        }
        Commands::HistoryCleanup { days_to_keep } => (
            "history_cleanup",
            serde_json::json!({ "daysToKeep": days_to_keep }),
        ),
        Commands::FlagsAdd { file_path, flag_type, reason } => (
            "flags_add",
            serde_json::json!({ "filePath": file_path, "flagType": flag_type, "reason": reason }),
        ),
        Commands::FlagsRemove { file_path, flag_type } => (
            "flags_remove",
            serde_json::json!({ "filePath": file_path, "flagType": flag_type }),
        ),
        Commands::FlagsList { filter } => ("flags_list", serde_json::json!({ "filter": filter })),
    };

    let result = dispatch(&workspace, tool, &args);
    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.get("success").and_then(|v| v.as_bool()) == Some(false) {
        std::process::exit(1);
    }
    Ok(())
}
