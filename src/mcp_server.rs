use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use copilot_memory::dispatch::dispatch;

// ── JSON-RPC 2.0 types ──────────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct RpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

#[derive(Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Serialize)]
struct RpcError {
    code: i32,
    message: String,
}

type MethodOutcome = Result<Value, (i32, String)>;

impl RpcResponse {
    fn from_outcome(id: Value, outcome: MethodOutcome) -> Self {
        match outcome {
            Ok(result) => Self { jsonrpc: "2.0", id, result: Some(result), error: None },
            Err((code, message)) => {
                Self { jsonrpc: "2.0", id, result: None, error: Some(RpcError { code, message }) }
            }
        }
    }
}

// ── Tool schema ─────────────────────────────────────────────────────────────
//
// One entry per capability-set action. Every tool takes
// "workspace" plus its own payload; `workspace` is stripped out before
// handing the rest to `dispatch`.

fn workspace_prop() -> Value {
    json!({ "type": "string", "description": "Absolute path to the workspace root" })
}

fn tools_list() -> Value {
    json!({
        "tools": [
            {
                "name": "section_read",
                "description": "Read every section of .github/copilot-instructions.md, each with its heading, body, and content hash.",
                "inputSchema": {
                    "type": "object",
                    "properties": { "workspace": workspace_prop() },
                    "required": ["workspace"]
                }
            },
            {
                "name": "section_update",
                "description": "Update or create one section. Pass expectedHash for optimistic concurrency; a stale hash produces conflict markers instead of overwriting.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "workspace": workspace_prop(),
                        "heading": { "type": "string" },
                        "content": { "type": "string" },
                        "expectedHash": { "type": "string" }
                    },
                    "required": ["workspace", "heading", "content"]
                }
            },
            {
                "name": "section_delete",
                "description": "Delete a section by heading.",
                "inputSchema": {
                    "type": "object",
                    "properties": { "workspace": workspace_prop(), "heading": { "type": "string" } },
                    "required": ["workspace", "heading"]
                }
            },
            {
                "name": "section_insert",
                "description": "Insert a new section at first, last, before <anchor>, or after <anchor>.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "workspace": workspace_prop(),
                        "heading": { "type": "string" },
                        "content": { "type": "string" },
                        "position": { "type": "string", "enum": ["first", "last", "before", "after"] },
                        "anchor": { "type": "string" }
                    },
                    "required": ["workspace", "heading", "content"]
                }
            },
            {
                "name": "detect_conflicts",
                "description": "List unresolved conflict-marker blocks across the instructions file.",
                "inputSchema": {
                    "type": "object",
                    "properties": { "workspace": workspace_prop() },
                    "required": ["workspace"]
                }
            },
            {
                "name": "resolve_conflict",
                "description": "Resolve one conflict block via use-external, use-local, or use-manual (manualContent required for the latter).",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "workspace": workspace_prop(),
                        "heading": { "type": "string" },
                        "resolution": { "type": "string", "enum": ["use-external", "use-local", "use-manual"] },
                        "manualContent": { "type": "string" }
                    },
                    "required": ["workspace", "heading", "resolution"]
                }
            },
            {
                "name": "context_read",
                "description": "Read the current Development Context (phase, focus, priority, mode).",
                "inputSchema": {
                    "type": "object",
                    "properties": { "workspace": workspace_prop() },
                    "required": ["workspace"]
                }
            },
            {
                "name": "context_update",
                "description": "Merge a partial state onto the Development Context, persist it, and regenerate the instructions file unless autoRegenerate is false.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "workspace": workspace_prop(),
                        "state": {
                            "type": "object",
                            "properties": {
                                "phase": { "type": "string" },
                                "focus": { "type": "array", "items": { "type": "string" } },
                                "priority": { "type": "string" },
                                "mode": { "type": "string" }
                            }
                        },
                        "autoRegenerate": { "type": "boolean" }
                    },
                    "required": ["workspace", "state"]
                }
            },
            {
                "name": "context_reset",
                "description": "Reset the Development Context to defaults.",
                "inputSchema": {
                    "type": "object",
                    "properties": { "workspace": workspace_prop() },
                    "required": ["workspace"]
                }
            },
            {
                "name": "context_rollback",
                "description": "Restore the Development Context and the instructions file from a history entry by index (0 = newest) or RFC3339 timestamp. The corpus is never restored.",
                "inputSchema": {
                    "type": "object",
                    "properties": { "workspace": workspace_prop(), "timestamp": { "type": "string" } },
                    "required": ["workspace", "timestamp"]
                }
            },
            {
                "name": "history_list",
                "description": "List history entries, newest first.",
                "inputSchema": {
                    "type": "object",
                    "properties": { "workspace": workspace_prop(), "limit": { "type": "integer" } },
                    "required": ["workspace"]
                }
            },
            {
                "name": "history_diff",
                "description": "Diff two history entries by index or timestamp.",
                "inputSchema": {
                    "type": "object",
                    "properties": { "workspace": workspace_prop(), "from": { "type": "string" }, "to": { "type": "string" } },
                    "required": ["workspace", "from", "to"]
                }
            },
            {
                "name": "history_cleanup",
                "description": "Delete history entries older than daysToKeep days.",
                "inputSchema": {
                    "type": "object",
                    "properties": { "workspace": workspace_prop(), "daysToKeep": { "type": "integer" } },
                    "required": ["workspace"]
                }
            },
            {
                "name": "flags_add",
                "description": "Flag a corpus fragment as criticalFeedback or copilotEssential, subject to soft/hard caps.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "workspace": workspace_prop(),
                        "filePath": { "type": "string" },
                        "flagType": { "type": "string", "enum": ["criticalFeedback", "copilotEssential"] },
                        "reason": { "type": "string" }
                    },
                    "required": ["workspace", "filePath", "flagType"]
                }
            },
            {
                "name": "flags_remove",
                "description": "Remove a priority flag from a corpus fragment.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "workspace": workspace_prop(),
                        "filePath": { "type": "string" },
                        "flagType": { "type": "string", "enum": ["criticalFeedback", "copilotEssential"] }
                    },
                    "required": ["workspace", "filePath", "flagType"]
                }
            },
            {
                "name": "flags_list",
                "description": "Report priority-flag counts against their soft/hard caps, optionally filtered to one flag kind.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "workspace": workspace_prop(),
                        "filter": { "type": "string", "enum": ["criticalFeedback", "copilotEssential"] }
                    },
                    "required": ["workspace"]
                }
            }
        ]
    })
}

// ── Tool dispatch ────────────────────────────────────────────────────────────

fn call_tool(name: &str, args: &Value) -> Result<Value, String> {
    let workspace = args
        .get("workspace")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .ok_or("Missing required parameter: workspace")?;

    let result = dispatch(&workspace, name, args);
    if result.get("success").and_then(|v| v.as_bool()) == Some(false) {
        let message = result
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
            .to_string();
        return Err(message);
    }
    Ok(result)
}

// ── Method dispatch: pure, no I/O ───────────────────────────────────────────
//
// Returns `None` for a notification (no response owed), `Some(Err(..))` for
// a JSON-RPC-level error (unknown method), `Some(Ok(..))` for a result.

fn handle_method(method: &str, params: Option<&Value>) -> Option<MethodOutcome> {
    match method {
        "initialize" => Some(Ok(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": "copilot-memory",
                "version": env!("CARGO_PKG_VERSION")
            }
        }))),

        "notifications/initialized" => None,

        "tools/list" => Some(Ok(tools_list())),

        "tools/call" => {
            let params = params.unwrap_or(&Value::Null);
            let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
            let args = params.get("arguments").unwrap_or(&Value::Null);

            let (content_text, is_error) = match call_tool(name, args) {
                Ok(result) => (
                    serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string()),
                    false,
                ),
                Err(e) => (e, true),
            };

            Some(Ok(json!({
                "content": [{ "type": "text", "text": content_text }],
                "isError": is_error
            })))
        }

        other => Some(Err((-32601, format!("Method not found: {other}")))),
    }
}

/// Parses one line of input and dispatches it. `None` means the line was a
/// notification and no response should be sent.
fn process_line(line: &str) -> Option<RpcResponse> {
    let req: RpcRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            return Some(RpcResponse::from_outcome(
                Value::Null,
                Err((-32700, format!("Parse error: {e}"))),
            ))
        }
    };
    let id = req.id.clone().unwrap_or(Value::Null);
    let outcome = handle_method(&req.method, req.params.as_ref())?;
    Some(RpcResponse::from_outcome(id, outcome))
}

// ── Transport: newline-delimited JSON-RPC over stdio ────────────────────────

fn send(resp: &RpcResponse) {
    let line = serde_json::to_string(resp).expect("serialization cannot fail");
    println!("{line}");
    io::stdout().flush().ok();
}

fn init_logging() {
    // All logging goes to stderr so stdout remains clean JSON-RPC.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();
}

fn main() {
    init_logging();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) if l.trim().is_empty() => continue,
            Ok(l) => l,
            Err(e) => {
                eprintln!("copilot-memory-mcp: stdin error: {e}");
                break;
            }
        };

        if let Some(resp) = process_line(&line) {
            send(&resp);
        }
    }
}
