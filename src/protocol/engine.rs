//! Per-session MCP protocol engine.
//!
//! The engine is the sole consumer of a session's receive queue and the sole
//! producer onto its send queue. It dispatches the fixed method set
//! (initialize / initialized / ping / tools/list / tools/call) and serializes
//! every reply into an opaque frame for the transport to deliver.
//!
//! Tool execution failures are reported as tool results with `isError: true`,
//! never as transport errors - by the time a tool runs, the submission that
//! carried it has long been acknowledged.

use crate::protocol::message::{JsonRpcRequest, JsonRpcResponse, error_codes};
use crate::tools::query::{QueryInput, QueryToolHandler};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// MCP protocol revision implemented by this server (HTTP+SSE transport).
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name advertised during the handshake.
pub const SERVER_NAME: &str = "mysql-mcp-server";

/// Parameters of a tools/call request.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// Stateless MCP request dispatcher, shared by all sessions.
pub struct ProtocolEngine {
    query_tool: Arc<QueryToolHandler>,
    /// JSON schema for the query tool input, built once
    query_schema: Value,
}

impl ProtocolEngine {
    /// Create an engine around the single registered tool.
    pub fn new(query_tool: Arc<QueryToolHandler>) -> Self {
        let query_schema = serde_json::to_value(schemars::schema_for!(QueryInput))
            .unwrap_or_else(|_| json!({"type": "object"}));
        Self {
            query_tool,
            query_schema,
        }
    }

    /// Drive one session: drain its receive queue until the transport tears
    /// the session down, publishing each reply on the send queue.
    ///
    /// Returns when the receive queue closes (session removed from the
    /// registry) or a publish fails (stream already gone).
    pub async fn run(
        &self,
        session_id: &str,
        mut receive: mpsc::UnboundedReceiver<JsonRpcRequest>,
        send: mpsc::UnboundedSender<String>,
    ) {
        while let Some(request) = receive.recv().await {
            let Some(response) = self.handle(request).await else {
                continue;
            };
            let frame = match serde_json::to_string(&response) {
                Ok(frame) => frame,
                Err(e) => {
                    error!(session_id = %session_id, error = %e, "Failed to serialize response");
                    continue;
                }
            };
            if send.send(frame).is_err() {
                debug!(session_id = %session_id, "Session closed, dropping response");
                break;
            }
        }
        debug!(session_id = %session_id, "Protocol engine finished");
    }

    /// Dispatch a single request. Returns None for notifications.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id.clone();
        debug!(method = %request.method, "Handling request");

        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(id)),
            "notifications/initialized" => {
                debug!("Client initialization complete");
                None
            }
            "notifications/cancelled" => None,
            "ping" => Some(JsonRpcResponse::success(id, json!({}))),
            "tools/list" => Some(self.handle_list_tools(id)),
            "tools/call" => {
                Some(
                    self.handle_call_tool(id, request.params.unwrap_or_else(|| json!({})))
                        .await,
                )
            }
            _ => {
                if request.is_notification() {
                    debug!(method = %request.method, "Ignoring unknown notification");
                    return None;
                }
                Some(JsonRpcResponse::error(
                    id,
                    error_codes::METHOD_NOT_FOUND,
                    format!("Method not found: {}", request.method),
                ))
            }
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Session initializing");
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    fn handle_list_tools(&self, id: Option<Value>) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            json!({
                "tools": [
                    {
                        "name": "query",
                        "description": "Execute a SELECT query against the MySQL database. \
                            Only SELECT statements are allowed, ensuring read-only access.",
                        "inputSchema": self.query_schema.clone()
                    }
                ]
            }),
        )
    }

    async fn handle_call_tool(&self, id: Option<Value>, params: Value) -> JsonRpcResponse {
        let params: ToolCallParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => {
                return JsonRpcResponse::error(
                    id,
                    error_codes::INVALID_PARAMS,
                    format!("Invalid tools/call parameters: {}", e),
                );
            }
        };

        info!(tool = %params.name, "Tool call received");

        if params.name != "query" {
            return JsonRpcResponse::success(
                id,
                tool_error_result("UNKNOWN_TOOL", format!("Unknown tool: {}", params.name)),
            );
        }

        let input: QueryInput =
            match serde_json::from_value(params.arguments.unwrap_or_else(|| json!({}))) {
                Ok(input) => input,
                Err(e) => {
                    warn!(error = %e, "Rejecting query call with invalid arguments");
                    return JsonRpcResponse::success(
                        id,
                        tool_error_result(
                            "MISSING_PARAMETER",
                            "A 'sql' string argument is required",
                        ),
                    );
                }
            };

        match self.query_tool.query(input).await {
            Ok(output) => {
                let text = serde_json::to_string_pretty(&output)
                    .unwrap_or_else(|_| "{}".to_string());
                JsonRpcResponse::success(id, tool_text_result(text, false))
            }
            Err(e) => {
                warn!(error = %e, "Query tool failed");
                JsonRpcResponse::success(id, tool_error_result(e.tool_error_code(), e.to_string()))
            }
        }
    }
}

/// Build an MCP tool result carrying a single text content block.
fn tool_text_result(text: String, is_error: bool) -> Value {
    json!({
        "content": [
            {
                "type": "text",
                "text": text
            }
        ],
        "isError": is_error
    })
}

/// Build an MCP tool error result with the original error vocabulary.
fn tool_error_result(error_code: &str, message: impl Into<String>) -> Value {
    let body = json!({
        "success": false,
        "error_code": error_code,
        "message": message.into()
    });
    let text = serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
    tool_text_result(text, true)
}
