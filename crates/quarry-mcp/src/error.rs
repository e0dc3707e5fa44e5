//! Error types for the MCP crate.

use thiserror::Error;

/// Errors raised by a backing-store client.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failure reported by the SQL engine, passed through verbatim.
    #[error("{0}")]
    Engine(String),

    /// `alter_table` was asked for an action outside the supported set.
    #[error("unknown alter_table action: {0} (expected add_column, rename_column or rename_table)")]
    UnknownAction(String),

    /// An argument could not be turned into SQL.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The remote server could not be reached or rejected the request.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The remote server answered with something that is not valid Hrana.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => StoreError::Engine(db.message().to_string()),
            other => StoreError::Engine(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Connection(err.to_string())
    }
}

/// Errors raised while resolving the backing-store client.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Neither a remote nor a local target is configured.
    #[error("{0}")]
    NotConfigured(#[from] quarry_core::ConfigError),

    /// The target is configured but the connection could not be established.
    #[error("failed to connect to {target}: {reason}")]
    ConnectionFailure { target: String, reason: String },
}

/// Errors that can surface from a tool call. Every variant is reported to the
/// caller as an error envelope.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Tool name is not in the catalog.
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    /// Arguments do not satisfy the tool's input contract.
    #[error("invalid arguments for tool {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// No backing store configured.
    #[error("{0}")]
    NotConfigured(String),

    /// Connecting to the backing store failed.
    #[error("{0}")]
    ConnectionFailure(String),

    /// Unsupported `alter_table` action.
    #[error("{0}")]
    UnknownAction(String),

    /// Error reported by the engine.
    #[error("{0}")]
    Engine(String),
}

impl From<ResolveError> for DispatchError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotConfigured(e) => DispatchError::NotConfigured(e.to_string()),
            e @ ResolveError::ConnectionFailure { .. } => {
                DispatchError::ConnectionFailure(e.to_string())
            }
        }
    }
}

impl DispatchError {
    /// Convert a client failure raised while running `tool`.
    pub fn from_store(tool: &str, err: StoreError) -> Self {
        match err {
            StoreError::Engine(msg) => DispatchError::Engine(msg),
            e @ StoreError::UnknownAction(_) => DispatchError::UnknownAction(e.to_string()),
            StoreError::InvalidArguments(reason) => DispatchError::InvalidArguments {
                tool: tool.to_string(),
                reason,
            },
            e @ (StoreError::Connection(_) | StoreError::Protocol(_)) => {
                DispatchError::ConnectionFailure(e.to_string())
            }
        }
    }
}

/// Errors that can occur in the MCP server.
#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to start the server.
    #[error("failed to start MCP server: {0}")]
    StartupFailed(String),

    /// Transport error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
