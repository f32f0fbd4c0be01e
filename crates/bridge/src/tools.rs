//! Tool definitions and result shapes for the MCP surface.

use serde::Serialize;
use serde_json::{json, Value};

/// One advertised tool: name, description, JSON Schema of its arguments.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDefinition {
    fn new(name: &str, description: &str, input_schema: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
}

/// The MCP tool-call result envelope: JSON rendered into a text block.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolResult {
    pub fn json<T: Serialize>(value: &T) -> Self {
        let text = serde_json::to_string_pretty(value)
            .unwrap_or_else(|e| json!({"error": e.to_string()}).to_string());
        Self {
            content: vec![ToolContent::Text { text }],
            is_error: None,
        }
    }
}

fn session_id_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "session_id": {"type": "string", "description": "Id of the debug session"}
        },
        "required": ["session_id"]
    })
}

/// Every tool the bridge serves.
pub fn all_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            "start_debug_session",
            "Launch a Python script under debugpy and open a debug session",
            json!({
                "type": "object",
                "properties": {
                    "script_path": {"type": "string", "description": "Path to the Python script"},
                    "args": {"type": "array", "items": {"type": "string"}, "description": "Arguments passed to the script"},
                    "cwd": {"type": "string", "description": "Working directory for the script"}
                },
                "required": ["script_path"]
            }),
        ),
        ToolDefinition::new(
            "attach_to_debugpy",
            "Attach to an already-running debugpy listener",
            json!({
                "type": "object",
                "properties": {
                    "script_path": {"type": "string", "description": "Path of the script being debugged"},
                    "port": {"type": "integer", "description": "Port the listener is on (default 5678)"}
                },
                "required": ["script_path"]
            }),
        ),
        ToolDefinition::new(
            "stop_debug_session",
            "Terminate a debug session and its adapter process",
            session_id_schema(),
        ),
        ToolDefinition::new(
            "list_debug_sessions",
            "List active debug sessions with aggregate counts",
            json!({"type": "object", "properties": {}}),
        ),
        ToolDefinition::new(
            "set_breakpoint",
            "Set a breakpoint at a file and line",
            json!({
                "type": "object",
                "properties": {
                    "session_id": {"type": "string"},
                    "file": {"type": "string", "description": "Source file path"},
                    "line": {"type": "integer", "minimum": 1}
                },
                "required": ["session_id", "file", "line"]
            }),
        ),
        ToolDefinition::new(
            "remove_breakpoint",
            "Remove a breakpoint previously set at a file and line",
            json!({
                "type": "object",
                "properties": {
                    "session_id": {"type": "string"},
                    "file": {"type": "string"},
                    "line": {"type": "integer", "minimum": 1}
                },
                "required": ["session_id", "file", "line"]
            }),
        ),
        ToolDefinition::new(
            "list_breakpoints",
            "List breakpoints, optionally for a single file",
            json!({
                "type": "object",
                "properties": {
                    "session_id": {"type": "string"},
                    "file": {"type": "string", "description": "Only breakpoints in this file"}
                },
                "required": ["session_id"]
            }),
        ),
        ToolDefinition::new(
            "debug_continue",
            "Resume execution of the paused program",
            session_id_schema(),
        ),
        ToolDefinition::new(
            "debug_step_over",
            "Step over the current line",
            session_id_schema(),
        ),
        ToolDefinition::new(
            "debug_step_in",
            "Step into the call on the current line",
            session_id_schema(),
        ),
        ToolDefinition::new(
            "debug_step_out",
            "Step out of the current function",
            session_id_schema(),
        ),
        ToolDefinition::new(
            "get_variables",
            "Inspect variables of the current frame",
            json!({
                "type": "object",
                "properties": {
                    "session_id": {"type": "string"},
                    "scope": {
                        "type": "string",
                        "enum": ["local", "global", "all"],
                        "description": "Which scopes to include (default local)"
                    }
                },
                "required": ["session_id"]
            }),
        ),
        ToolDefinition::new(
            "get_call_stack",
            "Call stack of the paused thread",
            session_id_schema(),
        ),
        ToolDefinition::new(
            "evaluate_expression",
            "Evaluate an expression in the current frame",
            json!({
                "type": "object",
                "properties": {
                    "session_id": {"type": "string"},
                    "expression": {"type": "string"}
                },
                "required": ["session_id", "expression"]
            }),
        ),
        ToolDefinition::new(
            "check_python_setup",
            "Report whether python and debugpy are available",
            json!({"type": "object", "properties": {}}),
        ),
    ]
}
