//! JSON-RPC 2.0 stdio transport for the Bazaar tool surface.
//!
//! Speaks the MCP handshake (`initialize`, `tools/list`, `tools/call`) over
//! newline-delimited JSON on stdin/stdout. Tool failures are returned as
//! `isError` tool results, not protocol errors, so an agent runtime can
//! read them; only malformed JSON-RPC traffic produces protocol errors.
//!
//! Diagnostics go to stderr via `tracing`; stdout belongs to the
//! transport.

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::tools::BazaarTools;
use crate::types::CallToolResult;

/// Server name advertised during the MCP handshake.
pub const SERVER_NAME: &str = "x402 Bazaar MCP";

/// MCP protocol revision this server implements.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC error code for an unknown method.
const METHOD_NOT_FOUND: i32 = -32601;

/// JSON-RPC error code for unparseable traffic.
const PARSE_ERROR: i32 = -32700;

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct CallParams {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// MCP server wiring the Bazaar tools to a stdio transport.
#[derive(Debug)]
pub struct McpServer {
    tools: BazaarTools,
}

impl McpServer {
    /// Creates a server around the given tool surface.
    #[must_use]
    pub fn new(tools: BazaarTools) -> Self {
        Self { tools }
    }

    /// Serves requests from stdin until it closes.
    ///
    /// # Errors
    ///
    /// Returns an error when stdin/stdout I/O fails.
    pub async fn run_stdio(self) -> std::io::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let Some(response) = self.handle_line(&line).await else {
                continue;
            };
            stdout.write_all(response.to_string().as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok(())
    }

    /// Handles one line of JSON-RPC traffic. Returns `None` for
    /// notifications, which get no response.
    pub async fn handle_line(&self, line: &str) -> Option<Value> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(error) => {
                tracing::warn!(%error, "discarding unparseable JSON-RPC line");
                return Some(error_response(Value::Null, PARSE_ERROR, "Parse error"));
            }
        };

        let id = request.id.clone();
        let result = self.dispatch(&request).await;

        // Notifications never get a response, whatever they asked for.
        let id = id?;
        Some(match result {
            Ok(value) => result_response(id, value),
            Err((code, message)) => error_response(id, code, &message),
        })
    }

    async fn dispatch(&self, request: &JsonRpcRequest) -> Result<Value, (i32, String)> {
        match request.method.as_str() {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            })),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({"tools": BazaarTools::definitions()})),
            "tools/call" => {
                let params: CallParams = request
                    .params
                    .clone()
                    .map_or_else(|| Ok(CallParams::default()), serde_json::from_value)
                    .map_err(|error| (PARSE_ERROR, error.to_string()))?;
                let arguments = params.arguments.unwrap_or_else(|| json!({}));

                let result = match self.tools.call(&params.name, arguments).await {
                    Ok(result) => result,
                    // Tool failures are data, not protocol errors.
                    Err(error) => {
                        tracing::warn!(tool = %params.name, %error, "tool call failed");
                        CallToolResult::error(error.to_string())
                    }
                };
                serde_json::to_value(result).map_err(|error| (PARSE_ERROR, error.to_string()))
            }
            "notifications/initialized" | "notifications/cancelled" => Ok(Value::Null),
            other => Err((METHOD_NOT_FOUND, format!("Method not found: {other}"))),
        }
    }
}

fn result_response(id: Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn error_response(id: Value, code: i32, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

#[cfg(test)]
mod tests {
    use super::*;
    use b402_http::{BazaarClient, PaidRequestExecutor};
    use b402_wallet::{SignerCredentials, SignerRegistry};

    fn server() -> McpServer {
        McpServer::new(BazaarTools::new(
            BazaarClient::new("http://127.0.0.1:1"),
            SignerRegistry::new(SignerCredentials::default()),
            PaidRequestExecutor::new(),
        ))
    }

    #[tokio::test]
    async fn initialize_advertises_tools_capability() {
        let response = server()
            .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
            .unwrap();
        assert_eq!(response["id"], json!(1));
        assert_eq!(response["result"]["serverInfo"]["name"], json!(SERVER_NAME));
        assert!(response["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn tools_list_includes_all_three_tools() {
        let response = server()
            .handle_line(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#)
            .await
            .unwrap();
        let tools = response["result"]["tools"].as_array().unwrap();
        let names: Vec<&str> = tools
            .iter()
            .map(|tool| tool["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                "list-bazaar-services",
                "inspect-bazaar-service",
                "call-bazaar-service"
            ]
        );
        assert!(tools[0]["inputSchema"]["properties"]["network"].is_object());
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let response = server()
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn unknown_methods_are_rejected() {
        let response = server()
            .handle_line(r#"{"jsonrpc":"2.0","id":3,"method":"resources/list"}"#)
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], json!(METHOD_NOT_FOUND));
    }

    #[tokio::test]
    async fn unparseable_lines_produce_a_parse_error() {
        let response = server().handle_line("{nope").await.unwrap();
        assert_eq!(response["error"]["code"], json!(PARSE_ERROR));
    }

    #[tokio::test]
    async fn tool_failures_become_error_results_not_protocol_errors() {
        let response = server()
            .handle_line(
                r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"mint-money","arguments":{}}}"#,
            )
            .await
            .unwrap();
        assert!(response.get("error").is_none());
        assert_eq!(response["result"]["isError"], json!(true));
    }

    #[tokio::test]
    async fn validation_failures_surface_through_tool_results() {
        let response = server()
            .handle_line(
                r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"list-bazaar-services","arguments":{"limit":0}}}"#,
            )
            .await
            .unwrap();
        assert_eq!(response["result"]["isError"], json!(true));
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("invalid tool input"), "{text}");
    }
}
