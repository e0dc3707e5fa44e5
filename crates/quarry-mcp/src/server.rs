//! MCP server implementation.
//!
//! [`McpServer`] answers JSON-RPC requests for one logical client: the
//! stdio transport uses a single instance, the HTTP transport one per
//! session. [`serve`] starts whichever transport the configuration names.

use crate::dispatcher::Dispatcher;
use crate::error::McpError;
use crate::http_transport::HttpServer;
use crate::protocol::*;
use crate::resolver::{ConnectionResolver, ResolverRegistry};
use quarry_core::{QuarryConfig, Transport};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Protocol handler bound to one connection resolver.
#[derive(Clone)]
pub struct McpServer {
    dispatcher: Arc<Dispatcher>,
    info: ServerInfo,
}

impl McpServer {
    pub fn new(resolver: Arc<ConnectionResolver>) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(resolver)),
            info: ServerInfo::default(),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Handle a JSON-RPC message. Notifications produce no response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            tracing::debug!(method = %request.method, "Received notification");
            return None;
        }

        let id = request.id.clone();
        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                id,
                codes::INVALID_REQUEST,
                "Invalid Request: jsonrpc must be \"2.0\"",
            ));
        }

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id, request.params.as_ref()),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => self.handle_call_tool(id, request.params).await,
            "shutdown" => self.handle_shutdown(id),
            _ => JsonRpcResponse::error(
                id,
                codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            ),
        };
        Some(response)
    }

    fn handle_initialize(&self, id: Option<Value>, params: Option<&Value>) -> JsonRpcResponse {
        let requested = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str);
        let version = negotiate_version(requested);
        tracing::debug!(requested = ?requested, negotiated = version, "Initialize");

        let result = json!({
            "protocolVersion": version,
            "serverInfo": self.info,
            "capabilities": {
                "tools": {
                    "listChanged": false
                }
            }
        });
        JsonRpcResponse::success(id, result)
    }

    fn handle_list_tools(&self, id: Option<Value>) -> JsonRpcResponse {
        let response = ListToolsResponse {
            tools: self.dispatcher.catalog().list().to_vec(),
        };
        match serde_json::to_value(response) {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => JsonRpcResponse::error(id, codes::INTERNAL_ERROR, e.to_string()),
        }
    }

    async fn handle_call_tool(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: CallToolParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => {
                    return JsonRpcResponse::error(
                        id,
                        codes::INVALID_PARAMS,
                        format!("Invalid params: {e}"),
                    );
                }
            },
            None => return JsonRpcResponse::error(id, codes::INVALID_PARAMS, "Missing params"),
        };

        let envelope = self
            .dispatcher
            .dispatch(&params.name, params.arguments)
            .await;
        match serde_json::to_value(envelope) {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => JsonRpcResponse::error(id, codes::INTERNAL_ERROR, e.to_string()),
        }
    }

    fn handle_shutdown(&self, id: Option<Value>) -> JsonRpcResponse {
        tracing::info!("Shutdown requested");
        JsonRpcResponse::success(id, json!({}))
    }

    /// Serve newline-delimited JSON-RPC on stdin/stdout until stdin closes.
    pub async fn run_stdio(&self) -> Result<(), McpError> {
        tracing::info!("Starting MCP server with stdio transport");
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();

        tokio::select! {
            result = self.serve_lines(stdin, stdout) => result,
            _ = shutdown_signal() => {
                tracing::info!("Interrupted, stopping stdio transport");
                Ok(())
            }
        }
    }

    /// Line-oriented request loop over any reader/writer pair.
    pub async fn serve_lines<R, W>(&self, reader: R, mut writer: W) -> Result<(), McpError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<JsonRpcRequest>(line) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => {
                    tracing::warn!(error = %e, "Unparsable request line");
                    Some(JsonRpcResponse::error(
                        None,
                        codes::PARSE_ERROR,
                        format!("Parse error: {e}"),
                    ))
                }
            };

            if let Some(response) = response {
                let mut encoded = serde_json::to_vec(&response)?;
                encoded.push(b'\n');
                writer.write_all(&encoded).await?;
                writer.flush().await?;
            }
        }

        tracing::info!("stdin closed, stopping stdio transport");
        Ok(())
    }
}

/// Run the configured transport until it stops, then close every client.
pub async fn serve(config: &QuarryConfig) -> Result<(), McpError> {
    let registry = Arc::new(ResolverRegistry::new(config.database.clone()));
    match config.database.target() {
        Ok(target) => tracing::info!(kind = target.kind(), target = %target.display_name(), "Database target configured"),
        Err(e) => tracing::warn!(error = %e, "Starting without a database target"),
    }

    let result = match config.mcp.transport {
        Transport::Stdio => McpServer::new(registry.default_resolver()).run_stdio().await,
        Transport::Http => {
            HttpServer::new(config.mcp.clone(), Arc::clone(&registry))
                .run()
                .await
        }
    };

    registry.close_all().await;
    result
}

/// Resolves when the process receives Ctrl-C.
pub(crate) async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
