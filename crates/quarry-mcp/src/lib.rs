//! # quarry-mcp
//!
//! MCP (Model Context Protocol) tool server for SQLite and libSQL databases.
//!
//! The server exposes a fixed catalog of 15 tools (queries, schema
//! inspection and management, index management, maintenance) over two
//! transports: newline-delimited JSON-RPC on stdio, and streamable HTTP with
//! per-client sessions.
//!
//! ## Architecture
//!
//! ```text
//! AI Agent
//!       │
//!       │ MCP protocol (list tools / call tool)
//!       ▼
//! ┌──────────────────────┐
//! │  Transport           │  stdio, or HTTP + SessionManager
//! │  McpServer           │  JSON-RPC methods
//! │  Dispatcher          │  ToolCatalog lookup, argument checks
//! │  ConnectionResolver  │  lazy, memoized client
//! └──────────┬───────────┘
//!            │ DatabaseClient
//!      ┌─────┴──────┐
//!      ▼            ▼
//!  LocalClient   RemoteClient
//!  (SQLite file) (libSQL, Hrana over HTTP)
//! ```
//!
//! ## Example Usage
//!
//! ```ignore
//! use quarry_core::QuarryConfig;
//!
//! let config = QuarryConfig::load(Some("quarry.yaml".as_ref()))?;
//! quarry_mcp::serve(&config).await?;
//! ```

pub mod dispatcher;
pub mod error;
pub mod http_transport;
pub mod protocol;
pub mod resolver;
pub mod server;
pub mod session;
pub mod store;
pub mod tools;

// Re-export main types
pub use dispatcher::Dispatcher;
pub use error::{DispatchError, McpError, ResolveError, StoreError};
pub use http_transport::{HttpServer, HttpTransportState, SESSION_HEADER, create_router};
pub use protocol::{
    CallToolParams, CallToolResponse, JsonRpcRequest, JsonRpcResponse, ToolAnnotations,
    ToolContent, ToolDefinition,
};
pub use resolver::{ConnectionResolver, ResolverRegistry};
pub use server::{McpServer, serve};
pub use session::{Session, SessionManager};
pub use store::{ClientHandle, DatabaseClient, LocalClient, RemoteClient, SqlValue};
pub use tools::{ToolCatalog, ToolGroup, ToolKind};
