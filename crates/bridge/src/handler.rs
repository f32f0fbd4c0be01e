//! Tool dispatch into the session engine.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use debugger::{ScopeFilter, SessionRegistry, SessionSummary};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::protocol::RpcError;
use crate::server::ToolHandler;
use crate::tools::ToolResult;

pub struct BridgeHandler {
    registry: Arc<SessionRegistry>,
}

impl BridgeHandler {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(arguments: Value) -> Result<T, RpcError> {
    serde_json::from_value(arguments).map_err(|e| RpcError::InvalidParams(e.to_string()))
}

fn engine_error(e: debugger::Error) -> RpcError {
    if e.is_invalid_params() {
        RpcError::InvalidParams(e.to_string())
    } else {
        RpcError::Internal(e.to_string())
    }
}

fn summary_json(summary: &SessionSummary) -> Value {
    json!({
        "session_id": summary.id,
        "script_path": summary.script,
        "state": summary.state,
        "port": summary.port,
    })
}

#[derive(Deserialize)]
struct StartArgs {
    script_path: PathBuf,
    #[serde(default)]
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

#[derive(Deserialize)]
struct AttachArgs {
    script_path: PathBuf,
    port: Option<u16>,
}

#[derive(Deserialize)]
struct SessionArgs {
    session_id: String,
}

#[derive(Deserialize)]
struct BreakpointArgs {
    session_id: String,
    file: PathBuf,
    line: i64,
}

#[derive(Deserialize)]
struct ListBreakpointsArgs {
    session_id: String,
    file: Option<PathBuf>,
}

#[derive(Deserialize)]
struct VariablesArgs {
    session_id: String,
    scope: Option<String>,
}

#[derive(Deserialize)]
struct EvaluateArgs {
    session_id: String,
    expression: String,
}

#[async_trait]
impl ToolHandler for BridgeHandler {
    async fn call(&self, name: &str, arguments: Value) -> Result<ToolResult, RpcError> {
        match name {
            "start_debug_session" => {
                let args: StartArgs = parse_args(arguments)?;
                let summary = self
                    .registry
                    .start_session(args.script_path, args.args, args.cwd)
                    .await
                    .map_err(engine_error)?;
                Ok(ToolResult::json(&summary_json(&summary)))
            }
            "attach_to_debugpy" => {
                let args: AttachArgs = parse_args(arguments)?;
                let summary = self
                    .registry
                    .attach_session(args.script_path, args.port)
                    .await
                    .map_err(engine_error)?;
                Ok(ToolResult::json(&summary_json(&summary)))
            }
            "stop_debug_session" => {
                let args: SessionArgs = parse_args(arguments)?;
                self.registry
                    .stop_session(&args.session_id)
                    .await
                    .map_err(engine_error)?;
                Ok(ToolResult::json(&json!({
                    "stopped": true,
                    "session_id": args.session_id,
                })))
            }
            "list_debug_sessions" => {
                let (summaries, stats) = self.registry.list().await;
                let sessions: Vec<Value> = summaries.iter().map(summary_json).collect();
                Ok(ToolResult::json(&json!({
                    "sessions": sessions,
                    "counts": stats,
                })))
            }
            "set_breakpoint" => {
                let args: BreakpointArgs = parse_args(arguments)?;
                let session = self
                    .registry
                    .get(&args.session_id)
                    .await
                    .map_err(engine_error)?;
                let breakpoint = session
                    .set_breakpoint(&args.file, args.line)
                    .await
                    .map_err(engine_error)?;
                Ok(ToolResult::json(&json!({
                    "file": breakpoint.file,
                    "line": breakpoint.line,
                    "verified": breakpoint.verified,
                })))
            }
            "remove_breakpoint" => {
                let args: BreakpointArgs = parse_args(arguments)?;
                let session = self
                    .registry
                    .get(&args.session_id)
                    .await
                    .map_err(engine_error)?;
                session
                    .remove_breakpoint(&args.file, args.line)
                    .await
                    .map_err(engine_error)?;
                Ok(ToolResult::json(&json!({
                    "removed": true,
                    "file": args.file,
                    "line": args.line,
                })))
            }
            "list_breakpoints" => {
                let args: ListBreakpointsArgs = parse_args(arguments)?;
                let session = self
                    .registry
                    .get(&args.session_id)
                    .await
                    .map_err(engine_error)?;
                let breakpoints = session.list_breakpoints(args.file.as_deref()).await;
                Ok(ToolResult::json(&json!({"breakpoints": breakpoints})))
            }
            "debug_continue" | "debug_step_over" | "debug_step_in" | "debug_step_out" => {
                let args: SessionArgs = parse_args(arguments)?;
                let session = self
                    .registry
                    .get(&args.session_id)
                    .await
                    .map_err(engine_error)?;
                match name {
                    "debug_continue" => session.continue_().await,
                    "debug_step_over" => session.step_over().await,
                    "debug_step_in" => session.step_in().await,
                    _ => session.step_out().await,
                }
                .map_err(engine_error)?;
                Ok(ToolResult::json(&json!({"ok": true, "action": name})))
            }
            "get_variables" => {
                let args: VariablesArgs = parse_args(arguments)?;
                let filter = match args.scope.as_deref() {
                    None => ScopeFilter::Local,
                    Some(raw) => ScopeFilter::from_str(raw).map_err(engine_error)?,
                };
                let session = self
                    .registry
                    .get(&args.session_id)
                    .await
                    .map_err(engine_error)?;
                let variables = session.get_variables(filter).await.map_err(engine_error)?;
                Ok(ToolResult::json(&json!({"variables": variables})))
            }
            "get_call_stack" => {
                let args: SessionArgs = parse_args(arguments)?;
                let session = self
                    .registry
                    .get(&args.session_id)
                    .await
                    .map_err(engine_error)?;
                let frames = session.get_call_stack().await.map_err(engine_error)?;
                Ok(ToolResult::json(&json!({"frames": frames})))
            }
            "evaluate_expression" => {
                let args: EvaluateArgs = parse_args(arguments)?;
                let session = self
                    .registry
                    .get(&args.session_id)
                    .await
                    .map_err(engine_error)?;
                // Adapter-side evaluation failures come back as data with
                // error=true, not as a tool error.
                let outcome = session
                    .evaluate(&args.expression)
                    .await
                    .map_err(engine_error)?;
                Ok(ToolResult::json(&outcome))
            }
            "check_python_setup" => {
                let setup = server::check_python_setup().await;
                Ok(ToolResult::json(&json!({
                    "python": setup.python,
                    "python_version": setup.python_version,
                    "debugpy_version": setup.debugpy_version,
                    "debugpy_available": setup.debugpy_available(),
                })))
            }
            other => Err(RpcError::MethodNotFound(format!("tool {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use debugger::EventBus;

    fn handler() -> BridgeHandler {
        BridgeHandler::new(SessionRegistry::new(EventBus::new()))
    }

    #[tokio::test]
    async fn listing_an_empty_registry_succeeds() {
        let result = handler()
            .call("list_debug_sessions", json!({}))
            .await
            .unwrap();
        let crate::tools::ToolContent::Text { text } = &result.content[0];
        assert!(text.contains("\"sessions\": []"));
    }

    #[tokio::test]
    async fn missing_required_argument_is_invalid_params() {
        let err = handler().call("set_breakpoint", json!({})).await.unwrap_err();
        assert!(matches!(err, RpcError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn unknown_session_is_invalid_params() {
        let err = handler()
            .call("debug_continue", json!({"session_id": "missing"}))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn bad_scope_is_invalid_params() {
        let err = handler()
            .call(
                "get_variables",
                json!({"session_id": "missing", "scope": "universe"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn unknown_tool_is_method_not_found() {
        let err = handler().call("frobnicate", json!({})).await.unwrap_err();
        assert!(matches!(err, RpcError::MethodNotFound(_)));
    }
}
