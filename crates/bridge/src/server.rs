//! The stdio JSON-RPC loop.
//!
//! Requests arrive one per line on stdin; responses leave one per line on
//! stdout. Logging goes to stderr so stdout stays a clean protocol
//! channel. Tool failures never take the loop down: they become error
//! responses and the server keeps serving.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::protocol::{self, Request, RequestId, Response, RpcError};
use crate::tools::{self, ToolResult};

const SERVER_NAME: &str = "debug-bridge";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
const PROTOCOL_VERSION: &str = "2024-11-05";

/// The seam between the envelope and the engine.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, name: &str, arguments: Value) -> Result<ToolResult, RpcError>;
}

pub struct McpServer<H> {
    handler: Arc<H>,
}

impl<H: ToolHandler> McpServer<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// Serve until stdin closes.
    pub async fn run(&mut self) -> eyre::Result<()> {
        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut reader = BufReader::new(stdin);

        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                tracing::info!("stdin closed, shutting down");
                return Ok(());
            }

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let Some(response) = self.handle_line(line).await else {
                continue; // notification
            };

            let payload = serde_json::to_string(&response)?;
            stdout.write_all(payload.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }

    /// Returns `None` for notifications, which get no response.
    pub(crate) async fn handle_line(&self, line: &str) -> Option<Response> {
        let request = match protocol::parse_request(line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable request");
                return Some(Response::failure(RequestId::Null, e));
            }
        };

        let Some(id) = request.id.clone() else {
            tracing::debug!(method = %request.method, "notification");
            return None;
        };

        Some(self.handle_request(id, request).await)
    }

    async fn handle_request(&self, id: RequestId, request: Request) -> Response {
        let params = request.params.unwrap_or(Value::Null);

        match request.method.as_str() {
            "initialize" => Response::success(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION},
                }),
            ),
            "ping" => Response::success(id, json!({})),
            "tools/list" => Response::success(id, json!({"tools": tools::all_tools()})),
            "tools/call" => self.handle_tool_call(id, params).await,
            other => Response::failure(id, RpcError::MethodNotFound(other.to_string())),
        }
    }

    async fn handle_tool_call(&self, id: RequestId, params: Value) -> Response {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return Response::failure(
                id,
                RpcError::InvalidParams("missing tool name".to_string()),
            );
        };
        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));

        tracing::debug!(tool = name, "tool call");

        match self.handler.call(name, arguments).await {
            Ok(result) => match serde_json::to_value(&result) {
                Ok(value) => Response::success(id, value),
                Err(e) => Response::failure(id, RpcError::Internal(e.to_string())),
            },
            Err(e) => {
                tracing::debug!(tool = name, error = %e, "tool call failed");
                Response::failure(id, e)
            }
        }
    }
}
