//! Serve command.
//!
//! `quarry serve` - Start the MCP server on stdio.
//! `quarry serve --transport http --port 3000` - Start the streamable HTTP transport.
//!
//! Settings come from `quarry.yaml` (if present), then the environment, then
//! the flags below.

use anyhow::{Context, Result};
use clap::Args;
use quarry_core::{QuarryConfig, Transport};
use std::path::PathBuf;

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Configuration file. Missing files are ignored.
    #[arg(long, short, env = "QUARRY_CONFIG", default_value = "quarry.yaml")]
    pub config: PathBuf,

    /// Transport: stdio or http.
    #[arg(long, env = "MCP_TRANSPORT")]
    pub transport: Option<Transport>,

    /// HTTP listen host.
    #[arg(long, env = "MCP_HOST")]
    pub host: Option<String>,

    /// HTTP listen port.
    #[arg(long, env = "MCP_PORT")]
    pub port: Option<u16>,

    /// Allow `X-Database-*` headers to choose a session's database.
    #[arg(long, env = "MCP_ALLOW_TARGET_HEADERS", default_value_t = false)]
    pub allow_target_headers: bool,

    /// Close HTTP sessions idle for this many seconds (0 never expires them).
    #[arg(long, env = "MCP_SESSION_IDLE_TIMEOUT_SECS")]
    pub session_idle_timeout_secs: Option<u64>,

    /// Remote libSQL URL. Takes precedence over --db-path.
    #[arg(long, env = "DB_URL")]
    pub db_url: Option<String>,

    /// Auth token for the remote database.
    #[arg(long, env = "DB_AUTH_TOKEN", hide_env_values = true)]
    pub db_auth_token: Option<String>,

    /// Local SQLite file (`:memory:` for a scratch database).
    #[arg(long, env = "DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Busy timeout for the local engine, in milliseconds.
    #[arg(long, env = "DB_TIMEOUT_MS")]
    pub db_timeout_ms: Option<u64>,
}

impl ServeArgs {
    /// Flags win over file and environment values.
    pub fn apply_overrides(&self, config: &mut QuarryConfig) {
        if let Some(transport) = self.transport {
            config.mcp.transport = transport;
        }
        if let Some(host) = &self.host {
            config.mcp.host = host.clone();
        }
        if let Some(port) = self.port {
            config.mcp.port = port;
        }
        if self.allow_target_headers {
            config.mcp.allow_target_headers = true;
        }
        if let Some(secs) = self.session_idle_timeout_secs {
            config.mcp.session_idle_timeout_secs = secs;
        }

        if let Some(url) = self.db_url.as_deref().filter(|v| !v.trim().is_empty()) {
            config.database.url = Some(url.to_string());
        }
        if let Some(token) = self.db_auth_token.as_deref().filter(|v| !v.trim().is_empty()) {
            config.database.auth_token = Some(token.to_string());
        }
        if let Some(path) = self.db_path.as_ref().filter(|p| !p.as_os_str().is_empty()) {
            config.database.path = Some(path.clone());
        }
        if let Some(timeout) = self.db_timeout_ms {
            config.database.timeout_ms = timeout;
        }
    }
}

/// Run the server until the transport stops.
pub async fn run(args: ServeArgs) -> Result<()> {
    let mut config = QuarryConfig::load(Some(&args.config))
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;
    args.apply_overrides(&mut config);

    tracing::info!(
        transport = config.mcp.transport.as_str(),
        configured = config.database.is_configured(),
        "Starting Quarry MCP server"
    );

    quarry_mcp::serve(&config)
        .await
        .context("MCP server failed")?;
    Ok(())
}
