//! # quarry-core
//!
//! Configuration types shared across Quarry crates.
//!
//! Configuration is resolved once at start-up into an explicit [`QuarryConfig`]
//! and handed to the server by reference. Sources, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. An optional YAML file (`quarry.yaml`)
//! 3. Environment keys (`DB_URL`, `DB_AUTH_TOKEN`, `DB_PATH`, `DB_TIMEOUT_MS`)
//! 4. Command-line flags (applied by the binary)

pub mod config;

pub use config::{
    BackingStoreTarget, ConfigError, DatabaseConfig, McpConfig, QuarryConfig, Transport,
};
