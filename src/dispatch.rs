//! Shared capability dispatcher: each tool call is a tagged
//! `{action, payload}` variant handled in one place, with the
//! restricted-mode guard already centralized inside each writer (see
//! `restricted.rs`) rather than duplicated here. The CLI and the JSON-RPC
//! server both funnel through `dispatch`.

use serde_json::{json, Value};
use std::path::Path;

use crate::conflict::{self, Strategy};
use crate::context::{self, ContextPatch};
use crate::error::{CoreError, ErrorEnvelope};
use crate::flags::{self, FlagKind};
use crate::history::{self, EntryKey};
use crate::sections::{self, Position};

fn arg_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

fn err_value(e: &CoreError) -> Value {
    serde_json::to_value(ErrorEnvelope::from(e)).unwrap_or_else(|_| {
        json!({"success": false, "error": e.token()})
    })
}

fn ok_value(value: impl serde::Serialize) -> Value {
    let mut v = serde_json::to_value(value).unwrap_or(Value::Null);
    if let Value::Object(ref mut map) = v {
        map.entry("success").or_insert(Value::Bool(true));
    } else {
        return json!({"success": true, "result": v});
    }
    v
}

/// Dispatches one MCP tool / CLI action against the core. `tool` is one of
/// the snake_case action names matched in `dispatch_inner` below.
pub fn dispatch(workspace: &Path, tool: &str, args: &Value) -> Value {
    let result = dispatch_inner(workspace, tool, args);
    match result {
        Ok(v) => v,
        Err(e) => err_value(&e),
    }
}

fn dispatch_inner(workspace: &Path, tool: &str, args: &Value) -> Result<Value, CoreError> {
    match tool {
        "section_read" => {
            let sections = sections::read_sections(workspace)?;
            Ok(ok_value(json!({ "sections": sections })))
        }

        "section_update" => {
            let heading = arg_str(args, "heading")
                .ok_or_else(|| CoreError::NotFound("heading".to_string()))?;
            let content = arg_str(args, "content").unwrap_or("");
            let expected_hash = arg_str(args, "expectedHash");
            let snapshot: Option<Vec<sections::SectionSnapshot>> = args
                .get("initialSnapshot")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|s| {
                            Some(sections::SectionSnapshot {
                                heading: s.get("heading")?.as_str()?.to_string(),
                                hash: s.get("hash")?.as_str()?.to_string(),
                            })
                        })
                        .collect()
                });
            let outcome = sections::update_section(
                workspace,
                heading,
                content,
                expected_hash,
                snapshot.as_deref(),
            )?;
            Ok(ok_value(outcome))
        }

        "section_delete" => {
            let heading = arg_str(args, "heading")
                .ok_or_else(|| CoreError::NotFound("heading".to_string()))?;
            sections::delete_section(workspace, heading)?;
            Ok(json!({"success": true}))
        }

        "section_insert" => {
            let heading = arg_str(args, "heading")
                .ok_or_else(|| CoreError::NotFound("heading".to_string()))?;
            let content = arg_str(args, "content").unwrap_or("");
            let position_arg = arg_str(args, "position").unwrap_or("last");
            let anchor = arg_str(args, "anchor");

            let position = match position_arg {
                "first" => Position::First,
                "last" => Position::Last,
                "before" => Position::Before(
                    anchor.ok_or_else(|| CoreError::AnchorNotFound(String::new()))?,
                ),
                "after" => Position::After(
                    anchor.ok_or_else(|| CoreError::AnchorNotFound(String::new()))?,
                ),
                other => return Err(CoreError::NotFound(format!("unknown position: {other}"))),
            };

            sections::insert_section(workspace, heading, content, position)?;
            Ok(json!({"success": true}))
        }

        "detect_conflicts" => {
            let conflicts = conflict::detect_conflicts(workspace)?;
            Ok(json!({"success": true, "conflicts": conflicts}))
        }

        "resolve_conflict" => {
            let heading = arg_str(args, "heading")
                .ok_or_else(|| CoreError::NotFound("heading".to_string()))?;
            let resolution = arg_str(args, "resolution").unwrap_or("");
            let strategy = Strategy::parse(resolution)
                .ok_or_else(|| CoreError::NotFound(format!("unknown resolution: {resolution}")))?;
            let manual = arg_str(args, "manualContent");
            conflict::resolve_conflict(workspace, heading, strategy, manual)?;
            Ok(json!({"success": true}))
        }

        "context_read" => {
            let ctx = context::read(workspace)?;
            Ok(ok_value(ctx))
        }

        "context_update" => {
            let patch = ContextPatch {
                phase: args
                    .get("state")
                    .and_then(|s| s.get("phase"))
                    .and_then(|v| v.as_str())
                    .and_then(parse_phase),
                focus: args
                    .get("state")
                    .and_then(|s| s.get("focus"))
                    .and_then(|v| v.as_array())
                    .map(|arr| arr.iter().filter_map(|x| x.as_str().map(String::from)).collect()),
                priority: args
                    .get("state")
                    .and_then(|s| s.get("priority"))
                    .and_then(|v| v.as_str())
                    .and_then(parse_priority),
                mode: args
                    .get("state")
                    .and_then(|s| s.get("mode"))
                    .and_then(|v| v.as_str())
                    .and_then(parse_mode),
            };
            let auto_regenerate = args.get("autoRegenerate").and_then(|v| v.as_bool());
            let ctx = context::update(workspace, patch, auto_regenerate)?;
            Ok(ok_value(ctx))
        }

        "context_reset" => {
            let ctx = context::reset(workspace)?;
            Ok(ok_value(ctx))
        }

        "context_rollback" => {
            let key = entry_key(args)?;
            let entry = history::rollback(workspace, key)?;
            Ok(json!({"success": true, "restoredTimestamp": entry.timestamp, "hash": entry.hash}))
        }

        "history_list" => {
            let limit = args.get("limit").and_then(|v| v.as_u64()).map(|n| n as usize);
            let entries = history::list(workspace, limit)?;
            Ok(json!({"success": true, "entries": entries}))
        }

        "history_diff" => {
            let from = entry_key_field(args, "from")?;
            let to = entry_key_field(args, "to")?;
            let diff = history::diff(workspace, from, to)?;
            Ok(ok_value(diff))
        }

        "history_cleanup" => {
            let days = args.get("daysToKeep").and_then(|v| v.as_i64()).unwrap_or(30);
            let removed = history::cleanup(workspace, days)?;
            Ok(json!({"success": true, "removed": removed}))
        }

        "flags_add" => {
            let path = arg_str(args, "filePath")
                .ok_or_else(|| CoreError::NotFound("filePath".to_string()))?;
            let kind = flag_kind(args)?;
            let reason = arg_str(args, "reason");
            let outcome = flags::add(workspace, path, kind, reason)?;
            Ok(ok_value(outcome))
        }

        "flags_remove" => {
            let path = arg_str(args, "filePath")
                .ok_or_else(|| CoreError::NotFound("filePath".to_string()))?;
            let kind = flag_kind(args)?;
            flags::remove(workspace, path, kind)?;
            Ok(json!({"success": true}))
        }

        "flags_list" => {
            let filter = arg_str(args, "filter").and_then(FlagKind::parse);
            let result = flags::list(workspace, filter)?;
            Ok(ok_value(result))
        }

        other => Err(CoreError::NotFound(format!("unknown tool: {other}"))),
    }
}

fn flag_kind(args: &Value) -> Result<FlagKind, CoreError> {
    let s = arg_str(args, "flagType").unwrap_or("");
    FlagKind::parse(s).ok_or_else(|| CoreError::NotFound(format!("unknown flagType: {s}")))
}

fn entry_key_field<'a>(args: &'a Value, field: &str) -> Result<EntryKey<'a>, CoreError> {
    let raw = args
        .get(field)
        .ok_or_else(|| CoreError::HistoryEntryNotFound(field.to_string()))?;
    entry_key_from_value(raw)
}

fn entry_key(args: &Value) -> Result<EntryKey<'_>, CoreError> {
    let raw = args
        .get("timestamp")
        .ok_or_else(|| CoreError::HistoryEntryNotFound("timestamp".to_string()))?;
    entry_key_from_value(raw)
}

fn entry_key_from_value(raw: &Value) -> Result<EntryKey<'_>, CoreError> {
    if let Some(n) = raw.as_u64() {
        return Ok(EntryKey::Index(n as usize));
    }
    if let Some(s) = raw.as_str() {
        if let Ok(n) = s.parse::<usize>() {
            return Ok(EntryKey::Index(n));
        }
        return Ok(EntryKey::Timestamp(s));
    }
    Err(CoreError::HistoryEntryNotFound("invalid key".to_string()))
}

fn parse_phase(s: &str) -> Option<context::Phase> {
    match s {
        "development" => Some(context::Phase::Development),
        "refactoring" => Some(context::Phase::Refactoring),
        "testing" => Some(context::Phase::Testing),
        "debugging" => Some(context::Phase::Debugging),
        "documentation" => Some(context::Phase::Documentation),
        _ => None,
    }
}

fn parse_priority(s: &str) -> Option<context::Priority> {
    match s {
        "high" => Some(context::Priority::High),
        "medium" => Some(context::Priority::Medium),
        "low" => Some(context::Priority::Low),
        _ => None,
    }
}

fn parse_mode(s: &str) -> Option<context::Mode> {
    match s {
        "normal" => Some(context::Mode::Normal),
        "strict" => Some(context::Mode::Strict),
        "experimental" => Some(context::Mode::Experimental),
        _ => None,
    }
}
