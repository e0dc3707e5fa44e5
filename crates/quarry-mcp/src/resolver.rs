//! Connection resolution.
//!
//! A [`ConnectionResolver`] turns a [`DatabaseConfig`] into a live client the
//! first time one is needed and hands out the same handle afterwards. Failed
//! attempts are not remembered, so the next call tries again.

use crate::error::ResolveError;
use crate::store::{self, ClientHandle};
use quarry_core::DatabaseConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;

/// Lazily connects to one configured target and memoizes the handle.
pub struct ConnectionResolver {
    config: DatabaseConfig,
    key: Option<String>,
    client: AsyncMutex<Option<ClientHandle>>,
}

impl ConnectionResolver {
    pub fn new(config: DatabaseConfig) -> Self {
        let key = config.target().ok().map(|t| t.key());
        Self {
            config,
            key,
            client: AsyncMutex::new(None),
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Target key, or `None` when nothing is configured.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Return the live client, connecting on first use.
    ///
    /// The lock is held while connecting so concurrent first calls share one
    /// attempt instead of opening two handles.
    pub async fn resolve(&self) -> Result<ClientHandle, ResolveError> {
        let mut slot = self.client.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(Arc::clone(client));
        }

        let target = self.config.target()?;
        tracing::info!(
            kind = target.kind(),
            target = %target.display_name(),
            "Connecting to database"
        );

        let client = store::connect(&target).await.map_err(|e| {
            tracing::warn!(target = %target.display_name(), error = %e, "Database connection failed");
            ResolveError::ConnectionFailure {
                target: target.display_name(),
                reason: e.to_string(),
            }
        })?;

        *slot = Some(Arc::clone(&client));
        Ok(client)
    }

    /// Whether a client has been resolved and not yet closed.
    pub async fn is_connected(&self) -> bool {
        self.client.lock().await.is_some()
    }

    /// Close the client if one is open. Later calls to `resolve` reconnect.
    pub async fn close(&self) {
        let client = self.client.lock().await.take();
        if let Some(client) = client {
            tracing::debug!(target = %client.target(), "Closing database client");
            client.close().await;
        }
    }
}

struct SharedResolver {
    resolver: Arc<ConnectionResolver>,
    sessions: usize,
}

/// Shares one resolver per target across HTTP sessions.
///
/// Resolvers other than the default are counted per session and closed once
/// the last session using them is released.
pub struct ResolverRegistry {
    default: Arc<ConnectionResolver>,
    by_target: Mutex<HashMap<String, SharedResolver>>,
}

impl ResolverRegistry {
    pub fn new(default_config: DatabaseConfig) -> Self {
        Self {
            default: Arc::new(ConnectionResolver::new(default_config)),
            by_target: Mutex::new(HashMap::new()),
        }
    }

    /// Resolver for the process-wide configuration.
    pub fn default_resolver(&self) -> Arc<ConnectionResolver> {
        Arc::clone(&self.default)
    }

    /// Resolver for `config`, shared with every other session naming the same
    /// target. Pair each call with [`ResolverRegistry::release`].
    pub fn for_config(&self, config: DatabaseConfig) -> Result<Arc<ConnectionResolver>, ResolveError> {
        let key = config.target()?.key();
        if self.default.key() == Some(key.as_str()) {
            return Ok(self.default_resolver());
        }

        let mut by_target = self.by_target.lock().unwrap_or_else(PoisonError::into_inner);
        let shared = by_target.entry(key).or_insert_with_key(|key| {
            tracing::debug!(target_key = %key, "Registering resolver");
            SharedResolver {
                resolver: Arc::new(ConnectionResolver::new(config)),
                sessions: 0,
            }
        });
        shared.sessions += 1;
        Ok(Arc::clone(&shared.resolver))
    }

    /// Drop one session's claim on `resolver`, closing it when no session is left.
    pub async fn release(&self, resolver: &Arc<ConnectionResolver>) {
        let Some(key) = resolver.key() else {
            return;
        };

        let evicted = {
            let mut by_target = self.by_target.lock().unwrap_or_else(PoisonError::into_inner);
            let remaining = match by_target.get_mut(key) {
                Some(shared) if Arc::ptr_eq(&shared.resolver, resolver) => {
                    shared.sessions = shared.sessions.saturating_sub(1);
                    Some(shared.sessions)
                }
                _ => None,
            };
            if remaining == Some(0) {
                by_target.remove(key).map(|shared| shared.resolver)
            } else {
                None
            }
        };

        if let Some(resolver) = evicted {
            tracing::debug!(target_key = %key, "Evicting unused resolver");
            resolver.close().await;
        }
    }

    /// Number of resolvers besides the default one.
    pub fn len(&self) -> usize {
        self.by_target
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every resolver's client.
    pub async fn close_all(&self) {
        let resolvers: Vec<Arc<ConnectionResolver>> = self
            .by_target
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, shared)| shared.resolver)
            .collect();

        self.default.close().await;
        futures::future::join_all(resolvers.iter().map(|r| r.close())).await;
    }
}
