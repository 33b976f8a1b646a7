//! Library crate backing both `copilot-memory-cli` and `copilot-memory-mcp`.
//!
//! Each file below owns exactly one concern — file state, locking, section
//! storage, conflict resolution, the fragment corpus and scorer, context
//! state, priority flags, generation, and history — and `dispatch.rs` is
//! the single place that turns a tool name plus a JSON payload into a call
//! against them.

pub mod conflict;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod flags;
pub mod fragments;
pub mod fs_state;
pub mod generator;
pub mod history;
pub mod lock;
pub mod paths;
pub mod restricted;
pub mod sections;
pub mod vcs;
