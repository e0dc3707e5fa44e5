//! MCP server configuration.
//!
//! Transport selection and HTTP listener settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    /// Transport type: "stdio" or "http".
    #[serde(default)]
    pub transport: Transport,

    /// HTTP host (only used when transport is HTTP).
    #[serde(default = "default_http_host")]
    pub host: String,

    /// HTTP port (only used when transport is HTTP).
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Let an initialization request pick its own database through
    /// `X-Database-*` headers (multi-tenant HTTP mode).
    #[serde(default)]
    pub allow_target_headers: bool,

    /// Seconds an HTTP session may go without a request before it is closed.
    /// `0` keeps sessions until they are deleted.
    #[serde(default = "default_session_idle_timeout_secs")]
    pub session_idle_timeout_secs: u64,
}

/// MCP transport type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Newline-delimited JSON-RPC over standard input/output.
    #[default]
    Stdio,
    /// Session-oriented streamable HTTP.
    Http,
}

impl Transport {
    /// Wire name of the transport, as reported by the health endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Stdio => "stdio",
            Transport::Http => "streamable-http",
        }
    }
}

impl std::str::FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stdio" => Ok(Transport::Stdio),
            "http" | "streamable-http" => Ok(Transport::Http),
            other => Err(format!("unknown transport: {other}. Use 'stdio' or 'http'")),
        }
    }
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            host: default_http_host(),
            port: default_http_port(),
            allow_target_headers: false,
            session_idle_timeout_secs: default_session_idle_timeout_secs(),
        }
    }
}

impl McpConfig {
    /// Socket address the HTTP transport binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Idle limit for HTTP sessions, if any.
    pub fn session_idle_timeout(&self) -> Option<Duration> {
        (self.session_idle_timeout_secs > 0)
            .then(|| Duration::from_secs(self.session_idle_timeout_secs))
    }

    /// Check if using HTTP transport.
    pub fn is_http(&self) -> bool {
        self.transport == Transport::Http
    }

    /// Check if using stdio transport.
    pub fn is_stdio(&self) -> bool {
        self.transport == Transport::Stdio
    }
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    3000
}

fn default_session_idle_timeout_secs() -> u64 {
    1800
}
