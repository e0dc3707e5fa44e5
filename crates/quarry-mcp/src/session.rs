//! HTTP session management.
//!
//! Each session is pinned to its own [`SessionTransport`], which serialises
//! the session's requests in arrival order. Sessions are created by an
//! `initialize` request without a session id and live until the client
//! deletes them, drops their event stream, leaves them idle past the
//! configured limit, or the server shuts down.

use crate::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::server::McpServer;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as SyncMutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, watch};

/// Per-session protocol endpoint.
pub struct SessionTransport {
    server: McpServer,
    order: Mutex<()>,
    closed: watch::Sender<bool>,
    last_active: SyncMutex<Instant>,
}

impl SessionTransport {
    pub fn new(server: McpServer) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            server,
            order: Mutex::new(()),
            closed,
            last_active: SyncMutex::new(Instant::now()),
        }
    }

    /// Handle one request after every earlier request of this session.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let _turn = self.order.lock().await;
        self.touch();
        self.server.handle_request(request).await
    }

    /// Time since the last request arrived.
    pub fn idle_for(&self) -> Duration {
        self.last_active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    fn touch(&self) {
        *self.last_active.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn server(&self) -> &McpServer {
        &self.server
    }

    /// Receiver that flips to `true` once the session is closed.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn close(&self) {
        self.closed.send_replace(true);
    }
}

/// A live client session.
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    transport: SessionTransport,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn transport(&self) -> &SessionTransport {
        &self.transport
    }
}

/// Live sessions keyed by id.
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session bound to `server`.
    pub async fn create(&self, server: McpServer) -> Arc<Session> {
        let session = Arc::new(Session {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            transport: SessionTransport::new(server),
        });

        self.sessions
            .write()
            .await
            .insert(session.id.clone(), Arc::clone(&session));

        tracing::info!(session_id = %session.id, "Session created");
        session
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Close and forget a session. Returns `None` when it was already gone.
    pub async fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.write().await.remove(id)?;
        session.transport.close();
        tracing::info!(session_id = %id, "Session closed");
        Some(session)
    }

    /// Ids of sessions that have been idle for at least `max_idle`.
    pub async fn idle(&self, max_idle: Duration) -> Vec<String> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.transport.idle_for() >= max_idle)
            .map(|s| s.id.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Close every session.
    pub async fn close_all(&self) {
        let sessions: Vec<Arc<Session>> = self.sessions.write().await.drain().map(|(_, s)| s).collect();
        for session in &sessions {
            session.transport.close();
        }
        if !sessions.is_empty() {
            tracing::info!(count = sessions.len(), "Closed all sessions");
        }
    }
}
