//! Shared test infrastructure for Quarry MCP end-to-end tests.
//!
//! This module provides:
//! - Temporary SQLite databases, one file per test
//! - Dispatcher and HTTP router fixtures
//! - Helper functions for test assertions

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use quarry_core::{DatabaseConfig, McpConfig};
use quarry_mcp::http_transport::{HttpTransportState, SESSION_HEADER, create_router};
use quarry_mcp::protocol::{CallToolResponse, ToolContent};
use quarry_mcp::{ConnectionResolver, Dispatcher, ResolverRegistry};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

// =============================================================================
// TEST CONTEXT
// =============================================================================

pub struct TestContext {
    pub dir: TempDir,
}

impl TestContext {
    pub fn setup() -> Result<Self, String> {
        let dir = tempfile::tempdir().map_err(|e| format!("Failed to create temp dir: {}", e))?;
        println!("✅ Using scratch directory {}", dir.path().display());
        Ok(Self { dir })
    }

    /// Path of a database file inside the scratch directory.
    pub fn db_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(format!("{name}.db"))
    }

    /// A dispatcher over a fresh database file.
    pub fn dispatcher(&self, name: &str) -> Dispatcher {
        Dispatcher::new(Arc::new(ConnectionResolver::new(DatabaseConfig::local(
            self.db_path(name),
        ))))
    }

    /// An HTTP router whose default target is a fresh database file.
    pub fn http(&self, name: &str, config: McpConfig) -> HttpFixture {
        let registry = Arc::new(ResolverRegistry::new(DatabaseConfig::local(
            self.db_path(name),
        )));
        let state = Arc::new(HttpTransportState::new(config, Arc::clone(&registry)));
        HttpFixture {
            router: create_router(Arc::clone(&state)),
            state,
            registry,
        }
    }
}

// =============================================================================
// TOOL CALL HELPERS
// =============================================================================

/// Extract JSON content from a tool result
pub fn extract_json(result: &CallToolResponse) -> Option<Value> {
    result.content.first().and_then(|c| match c {
        ToolContent::Text { text } => serde_json::from_str(text).ok(),
    })
}

/// Assert that a result is successful
pub fn assert_success(result: &CallToolResponse, msg: &str) {
    assert!(!result.is_error, "{}: {}", msg, result.text());
}

/// Assert that a result is a failure
pub fn assert_failure(result: &CallToolResponse, msg: &str) {
    assert!(result.is_error, "{}: {}", msg, result.text());
}

/// Call a tool, require success and return its payload.
pub async fn call_ok(dispatcher: &Dispatcher, tool: &str, arguments: Value) -> Value {
    let result = dispatcher.dispatch(tool, arguments).await;
    assert_success(&result, &format!("{tool} should succeed"));
    extract_json(&result).expect("Should have JSON response")
}

/// Call a tool, require failure and return its message.
pub async fn call_err(dispatcher: &Dispatcher, tool: &str, arguments: Value) -> String {
    let result = dispatcher.dispatch(tool, arguments).await;
    assert_failure(&result, &format!("{tool} should fail"));
    result.text().to_string()
}

/// Create the `people` table used by several modules.
pub async fn create_people(dispatcher: &Dispatcher) {
    call_ok(
        dispatcher,
        "create_table",
        json!({
            "table": "people",
            "columns": [
                { "name": "id", "type": "INTEGER", "primaryKey": true },
                { "name": "name", "type": "TEXT", "notNull": true },
                { "name": "email", "type": "TEXT", "unique": true },
                { "name": "status", "type": "TEXT", "default": "active" }
            ]
        }),
    )
    .await;
}

// =============================================================================
// HTTP HELPERS
// =============================================================================

pub struct HttpFixture {
    pub router: Router,
    pub state: Arc<HttpTransportState>,
    pub registry: Arc<ResolverRegistry>,
}

impl HttpFixture {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// POST a JSON-RPC message, optionally inside a session.
    pub async fn post(&self, session: Option<&str>, message: Value) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/mcp")
            .header("content-type", "application/json");
        if let Some(id) = session {
            builder = builder.header(SESSION_HEADER, id);
        }
        self.send(builder.body(Body::from(message.to_string())).unwrap())
            .await
    }

    /// Initialize a session and return its id.
    pub async fn initialize(&self, extra_headers: &[(&str, &str)]) -> String {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/mcp")
            .header("content-type", "application/json");
        for (name, value) in extra_headers {
            builder = builder.header(*name, *value);
        }
        let response = self
            .send(builder.body(Body::from(initialize_message().to_string())).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        session_id(&response).expect("initialize should return a session id")
    }

    /// Call a tool inside a session and return the result envelope.
    pub async fn call_tool(&self, session: &str, tool: &str, arguments: Value) -> Value {
        let response = self
            .post(
                Some(session),
                json!({
                    "jsonrpc": "2.0",
                    "id": 7,
                    "method": "tools/call",
                    "params": { "name": tool, "arguments": arguments }
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await["result"].clone()
    }
}

pub fn initialize_message() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": { "name": "e2e", "version": "0.0.0" }
        }
    })
}

pub fn session_id(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

/// Payload carried by a serialized result envelope.
pub fn envelope_payload(envelope: &Value) -> Value {
    assert_eq!(envelope["isError"], false, "unexpected error: {}", envelope);
    let text = envelope["content"][0]["text"]
        .as_str()
        .expect("envelope should carry text");
    serde_json::from_str(text).expect("envelope text should be JSON")
}
