//! Streamable HTTP transport for the MCP server.
//!
//! `POST /mcp` carries JSON-RPC requests, `GET /mcp` opens a server-sent
//! event stream for an existing session and `DELETE /mcp` ends a session.
//! Sessions are identified by the `Mcp-Session-Id` header.
//!
//! A session ends on `DELETE`, when its event stream is dropped, after the
//! configured idle limit, or at shutdown. Ending it releases the session's
//! claim on its resolver.

use crate::error::McpError;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, LATEST_PROTOCOL_VERSION, codes};
use crate::resolver::{ConnectionResolver, ResolverRegistry};
use crate::server::{McpServer, shutdown_signal};
use crate::session::{Session, SessionManager};
use crate::tools::ToolCatalog;
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response, Sse, sse::Event, sse::KeepAlive},
    routing::get,
};
use quarry_core::{DatabaseConfig, McpConfig, Transport};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Session id header.
pub const SESSION_HEADER: &str = "mcp-session-id";
/// Remote database URL for a new session.
pub const TARGET_URL_HEADER: &str = "x-database-url";
/// Auth token paired with [`TARGET_URL_HEADER`].
pub const TARGET_AUTH_HEADER: &str = "x-database-auth-token";
/// Local database path for a new session.
pub const TARGET_PATH_HEADER: &str = "x-database-path";

/// Shared state of the HTTP transport.
pub struct HttpTransportState {
    config: McpConfig,
    registry: Arc<ResolverRegistry>,
    sessions: SessionManager,
}

impl HttpTransportState {
    pub fn new(config: McpConfig, registry: Arc<ResolverRegistry>) -> Self {
        Self {
            config,
            registry,
            sessions: SessionManager::new(),
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn registry(&self) -> &Arc<ResolverRegistry> {
        &self.registry
    }

    /// Close a session and release its resolver. Returns `false` when it was already gone.
    pub async fn end_session(&self, id: &str) -> bool {
        let Some(session) = self.sessions.remove(id).await else {
            return false;
        };
        let resolver = session.transport().server().dispatcher().resolver();
        self.registry.release(resolver).await;
        true
    }

    /// End every session idle for at least `max_idle`. Returns how many ended.
    pub async fn expire_idle(&self, max_idle: Duration) -> usize {
        let mut expired = 0;
        for id in self.sessions.idle(max_idle).await {
            if self.end_session(&id).await {
                tracing::info!(session_id = %id, "Session expired after inactivity");
                expired += 1;
            }
        }
        expired
    }

    /// Resolver for a new session: the default one, or the target named in
    /// the request headers when that is allowed. Header paths must name an
    /// existing file.
    fn resolver_for(&self, headers: &HeaderMap) -> Result<Arc<ConnectionResolver>, String> {
        if !self.config.allow_target_headers {
            return Ok(self.registry.default_resolver());
        }

        let url = header_str(headers, TARGET_URL_HEADER);
        let path = header_str(headers, TARGET_PATH_HEADER);
        if url.is_none() && path.is_none() {
            return Ok(self.registry.default_resolver());
        }

        let config = DatabaseConfig {
            url: url.map(str::to_string),
            auth_token: header_str(headers, TARGET_AUTH_HEADER).map(str::to_string),
            path: path.map(PathBuf::from),
            timeout_ms: self.registry.default_resolver().config().timeout_ms,
            create_if_missing: false,
        };
        self.registry.for_config(config).map_err(|e| e.to_string())
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Create the HTTP router for MCP.
pub fn create_router(state: Arc<HttpTransportState>) -> Router {
    Router::new()
        .route("/", get(handle_health))
        .route("/health", get(handle_health))
        .route(
            "/mcp",
            get(handle_mcp_sse)
                .post(handle_mcp_post)
                .delete(handle_mcp_delete),
        )
        .with_state(state)
}

fn rpc_error(status: StatusCode, code: i32, message: impl Into<String>) -> Response {
    (status, Json(JsonRpcResponse::error(None, code, message))).into_response()
}

/// Ends the session when its event stream goes away.
struct StreamGuard {
    state: Arc<HttpTransportState>,
    session_id: String,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let state = Arc::clone(&self.state);
        let id = std::mem::take(&mut self.session_id);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if state.end_session(&id).await {
                    tracing::debug!(session_id = %id, "Event stream dropped, session closed");
                }
            });
        }
    }
}

/// Look up the session named by the request headers.
async fn existing_session(
    state: &HttpTransportState,
    headers: &HeaderMap,
) -> Result<Arc<Session>, Response> {
    let Some(id) = header_str(headers, SESSION_HEADER) else {
        return Err(rpc_error(
            StatusCode::BAD_REQUEST,
            codes::SESSION_NOT_FOUND,
            "Bad Request: No valid session ID provided",
        ));
    };
    match state.sessions.get(id).await {
        Some(session) => Ok(session),
        None => {
            tracing::debug!(session_id = %id, "Unknown session");
            Err(rpc_error(
                StatusCode::NOT_FOUND,
                codes::SESSION_NOT_FOUND,
                "Session not found",
            ))
        }
    }
}

/// Handle POST requests to /mcp.
async fn handle_mcp_post(
    State(state): State<Arc<HttpTransportState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return rpc_error(
                StatusCode::BAD_REQUEST,
                codes::PARSE_ERROR,
                format!("Parse error: {e}"),
            );
        }
    };

    if request.jsonrpc != "2.0" {
        return (
            StatusCode::BAD_REQUEST,
            Json(JsonRpcResponse::error(
                request.id,
                codes::INVALID_REQUEST,
                "Invalid Request: jsonrpc must be \"2.0\"",
            )),
        )
            .into_response();
    }

    if header_str(&headers, SESSION_HEADER).is_none() && request.is_initialize() {
        return initialize_session(&state, &headers, request).await;
    }

    let session = match existing_session(&state, &headers).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let session_header = [(SESSION_HEADER, session.id().to_string())];
    match session.transport().handle(request).await {
        Some(response) => (StatusCode::OK, session_header, Json(response)).into_response(),
        None => (StatusCode::ACCEPTED, session_header).into_response(),
    }
}

/// Run a header-less `initialize` and open a session only if it succeeds.
async fn initialize_session(
    state: &HttpTransportState,
    headers: &HeaderMap,
    request: JsonRpcRequest,
) -> Response {
    if request.is_notification() {
        return rpc_error(
            StatusCode::BAD_REQUEST,
            codes::INVALID_REQUEST,
            "Invalid Request: initialize must carry an id",
        );
    }

    let resolver = match state.resolver_for(headers) {
        Ok(resolver) => resolver,
        Err(message) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(JsonRpcResponse::error(
                    request.id,
                    codes::INVALID_PARAMS,
                    message,
                )),
            )
                .into_response();
        }
    };

    let server = McpServer::new(Arc::clone(&resolver));
    match server.handle_request(request).await {
        Some(response) if response.error.is_none() => {
            let session = state.sessions.create(server).await;
            (
                StatusCode::OK,
                [(SESSION_HEADER, session.id().to_string())],
                Json(response),
            )
                .into_response()
        }
        response => {
            state.registry.release(&resolver).await;
            let response = response.unwrap_or_else(|| {
                JsonRpcResponse::error(None, codes::INVALID_REQUEST, "Invalid initialize request")
            });
            (StatusCode::BAD_REQUEST, Json(response)).into_response()
        }
    }
}

/// Handle GET requests to /mcp: an event stream that ends with the session.
async fn handle_mcp_sse(
    State(state): State<Arc<HttpTransportState>>,
    headers: HeaderMap,
) -> Response {
    let session = match existing_session(&state, &headers).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let session_id = session.id().to_string();
    let mut closed = session.transport().closed_signal();
    tracing::debug!(session_id = %session_id, "Event stream opened");

    let guard = StreamGuard {
        state: Arc::clone(&state),
        session_id: session_id.clone(),
    };
    let stream = async_stream::stream! {
        let _guard = guard;
        while !*closed.borrow_and_update() {
            if closed.changed().await.is_err() {
                break;
            }
        }
        yield Ok::<_, Infallible>(Event::default().event("close").data(session_id));
    };

    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(30))
                .text("ping"),
        )
        .into_response()
}

/// Handle DELETE requests to /mcp.
async fn handle_mcp_delete(
    State(state): State<Arc<HttpTransportState>>,
    headers: HeaderMap,
) -> Response {
    let session = match existing_session(&state, &headers).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    state.end_session(session.id()).await;
    StatusCode::OK.into_response()
}

/// Handle health check requests. Never touches the database.
async fn handle_health(State(state): State<Arc<HttpTransportState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "name": "quarry",
        "version": env!("CARGO_PKG_VERSION"),
        "protocolVersion": LATEST_PROTOCOL_VERSION,
        "tools": ToolCatalog::global().len(),
        "transport": Transport::Http.as_str(),
        "sessions": state.sessions.len().await,
    }))
}

/// HTTP server for MCP transport.
pub struct HttpServer {
    config: McpConfig,
    state: Arc<HttpTransportState>,
}

impl HttpServer {
    pub fn new(config: McpConfig, registry: Arc<ResolverRegistry>) -> Self {
        Self {
            state: Arc::new(HttpTransportState::new(config.clone(), registry)),
            config,
        }
    }

    pub fn state(&self) -> &Arc<HttpTransportState> {
        &self.state
    }

    /// Run the HTTP server until Ctrl-C.
    pub async fn run(self) -> Result<(), McpError> {
        let address = self.config.bind_address();
        let app = create_router(Arc::clone(&self.state));

        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .map_err(|e| McpError::StartupFailed(format!("Failed to bind to {address}: {e}")))?;

        tracing::info!(address = %address, "MCP HTTP server listening");

        let reaper = self.config.session_idle_timeout().map(|max_idle| {
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                let mut ticks = tokio::time::interval((max_idle / 4).max(Duration::from_secs(1)));
                loop {
                    ticks.tick().await;
                    state.expire_idle(max_idle).await;
                }
            })
        });

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| McpError::TransportError(e.to_string()));

        if let Some(reaper) = reaper {
            reaper.abort();
        }
        tracing::info!("MCP HTTP server stopped");
        self.state.sessions.close_all().await;
        served
    }
}
