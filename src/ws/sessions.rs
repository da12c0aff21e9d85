//! Registry of open connections.
//!
//! [`SessionRegistry`] holds every connection between its open and close
//! events so handlers can reach peers other than their own (chat rooms,
//! fan-out notifications) and the diagnostics API can report live counts.

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::context::ConnectionContext;
use crate::domain::{ConnectionId, OutboundFrame};

/// Open connections keyed by id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ConnectionId, ConnectionContext>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection. Returns `false` if it was already present.
    pub async fn insert(&self, conn: ConnectionContext) -> bool {
        let mut map = self.sessions.write().await;
        map.insert(conn.id(), conn).is_none()
    }

    /// Removes a connection, returning it if it was present.
    pub async fn remove(&self, id: ConnectionId) -> Option<ConnectionContext> {
        self.sessions.write().await.remove(&id)
    }

    /// Looks up a connection by id.
    pub async fn get(&self, id: ConnectionId) -> Option<ConnectionContext> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Number of open connections.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns `true` if no connection is open.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Connections currently bound to the module at `path`.
    pub async fn by_module(&self, path: &str) -> Vec<ConnectionContext> {
        let map = self.sessions.read().await;
        map.values()
            .filter(|conn| conn.bound_module().as_deref() == Some(path))
            .cloned()
            .collect()
    }

    /// Queues `frame` for every connection bound to `path` and returns how
    /// many accepted it.
    pub async fn broadcast(&self, path: &str, frame: &OutboundFrame) -> usize {
        let targets = self.by_module(path).await;
        let mut delivered = 0_usize;
        for conn in targets {
            match conn.send(frame.clone()).await {
                Ok(()) => delivered = delivered.saturating_add(1),
                Err(e) => tracing::debug!(connection = %conn.id(), error = %e, "broadcast skipped"),
            }
        }
        delivered
    }
}
