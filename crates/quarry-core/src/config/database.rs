//! Backing database configuration.
//!
//! Two kinds of target are supported:
//! 1. A remote libSQL server (`DB_URL`, optionally with `DB_AUTH_TOKEN`)
//! 2. A local SQLite file (`DB_PATH`, with `DB_TIMEOUT_MS` as busy timeout)
//!
//! When both are configured the remote target wins.

use super::ConfigError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

/// Environment key holding the remote database URL.
pub const ENV_DB_URL: &str = "DB_URL";
/// Environment key holding the remote auth token.
pub const ENV_DB_AUTH_TOKEN: &str = "DB_AUTH_TOKEN";
/// Environment key holding the local database path.
pub const ENV_DB_PATH: &str = "DB_PATH";
/// Environment key holding the local busy timeout in milliseconds.
pub const ENV_DB_TIMEOUT_MS: &str = "DB_TIMEOUT_MS";

/// Default busy timeout for the local engine.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Configuration for the backing database.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Remote libSQL URL (`libsql://`, `https://`, `http://`, `wss://`, `ws://`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Bearer token sent to the remote server.
    #[serde(default, skip_serializing)]
    pub auth_token: Option<String>,

    /// Path of the local SQLite file. `:memory:` is accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Busy timeout of the local engine, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Create the local file when it does not exist yet.
    #[serde(default = "default_create_if_missing")]
    pub create_if_missing: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            auth_token: None,
            path: None,
            timeout_ms: default_timeout_ms(),
            create_if_missing: default_create_if_missing(),
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("path", &self.path)
            .field("timeout_ms", &self.timeout_ms)
            .field("create_if_missing", &self.create_if_missing)
            .finish()
    }
}

impl DatabaseConfig {
    /// Local target with the default timeout.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Remote target.
    pub fn remote(url: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            url: Some(url.into()),
            auth_token,
            ..Default::default()
        }
    }

    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from environment-style keys.
    ///
    /// Keys that are missing or blank leave the current value untouched.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_DB_URL) {
            self.url = Some(url);
        }
        if let Some(token) = get(ENV_DB_AUTH_TOKEN) {
            self.auth_token = Some(token);
        }
        if let Some(path) = get(ENV_DB_PATH) {
            self.path = Some(PathBuf::from(path));
        }
        if let Some(timeout) = get(ENV_DB_TIMEOUT_MS) {
            self.timeout_ms = timeout.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_DB_TIMEOUT_MS.to_string(),
                value: timeout.clone(),
            })?;
        }
        Ok(())
    }

    /// Whether any target is configured.
    pub fn is_configured(&self) -> bool {
        self.target().is_ok()
    }

    /// Resolve the configured target. A remote URL takes precedence over a path.
    pub fn target(&self) -> Result<BackingStoreTarget, ConfigError> {
        if let Some(url) = self.url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Ok(BackingStoreTarget::Remote {
                url: url.trim().to_string(),
                auth_token: self.auth_token.clone().filter(|t| !t.is_empty()),
            });
        }

        if let Some(path) = self.path.as_ref().filter(|p| !p.as_os_str().is_empty()) {
            return Ok(BackingStoreTarget::Local {
                path: path.clone(),
                timeout_ms: self.timeout_ms,
                create_if_missing: self.create_if_missing,
            });
        }

        Err(ConfigError::NotConfigured)
    }
}

/// A resolved backing database.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackingStoreTarget {
    /// Embedded SQLite file.
    Local {
        path: PathBuf,
        timeout_ms: u64,
        create_if_missing: bool,
    },
    /// Remote libSQL server.
    Remote {
        url: String,
        #[serde(default, skip_serializing)]
        auth_token: Option<String>,
    },
}

impl BackingStoreTarget {
    /// Short kind label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BackingStoreTarget::Local { .. } => "local",
            BackingStoreTarget::Remote { .. } => "remote",
        }
    }

    /// Stable key identifying the target. Two sessions with equal keys share one client.
    ///
    /// Remote keys carry a SHA-256 digest of the token, so callers presenting
    /// different credentials never share a connection.
    pub fn key(&self) -> String {
        match self {
            BackingStoreTarget::Local { path, .. } => format!("local:{}", path.display()),
            BackingStoreTarget::Remote {
                url,
                auth_token: None,
            } => format!("remote:{url}"),
            BackingStoreTarget::Remote {
                url,
                auth_token: Some(token),
            } => {
                let digest = Sha256::digest(token.as_bytes());
                format!("remote:{url}#{digest:x}")
            }
        }
    }

    /// Target identifier without credentials.
    pub fn display_name(&self) -> String {
        match self {
            BackingStoreTarget::Local { path, .. } => path.display().to_string(),
            BackingStoreTarget::Remote { url, .. } => url.clone(),
        }
    }
}

impl fmt::Debug for BackingStoreTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackingStoreTarget::Local {
                path,
                timeout_ms,
                create_if_missing,
            } => f
                .debug_struct("Local")
                .field("path", path)
                .field("timeout_ms", timeout_ms)
                .field("create_if_missing", create_if_missing)
                .finish(),
            BackingStoreTarget::Remote { url, auth_token } => f
                .debug_struct("Remote")
                .field("url", url)
                .field("auth_token", &auth_token.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

fn default_create_if_missing() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}
