//! Per-connection context and lifecycle state.
//!
//! A [`ConnectionContext`] is created when an upgrade request arrives and is
//! handed to every hook and handler for that connection. It carries the
//! connection's lifecycle state, its module binding and the outbound queue
//! the writer task drains.
//!
//! State is private to the connection: nothing here is shared between
//! connections, so dispatching on one connection never contends with another.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::codec::Codec;
use crate::domain::{Body, ConnectionId, OutboundFrame};
use crate::error::{LifecycleError, SendError};

/// Lifecycle state of one connection.
///
/// ```text
/// Connecting ──► HandshakeChecking ──► Open ──► Closed
///      │                 │                        ▲
///      └─────────────────┴────────────────────────┘ (rejected / dropped)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Upgrade request received, handshake not yet checked.
    Connecting,
    /// Handshake hook running or accepted, waiting for the socket to open.
    HandshakeChecking,
    /// Bound to a module; frames may be dispatched.
    Open,
    /// Terminal.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::HandshakeChecking => "handshake_checking",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// The module a connection is bound to while open.
#[derive(Debug, Clone)]
struct Binding {
    path: String,
    codec: Arc<dyn Codec>,
}

#[derive(Debug)]
struct Slot {
    state: ConnectionState,
    binding: Option<Binding>,
}

#[derive(Debug)]
struct Inner {
    id: ConnectionId,
    path: String,
    remote_addr: Option<SocketAddr>,
    connected_at: DateTime<Utc>,
    slot: Mutex<Slot>,
    dispatch_guard: tokio::sync::Mutex<()>,
    outbound: mpsc::Sender<OutboundFrame>,
}

/// Handle to one WebSocket connection. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    inner: Arc<Inner>,
}

impl ConnectionContext {
    /// Creates a context in the `Connecting` state whose outbound frames are
    /// pushed to `outbound`.
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        remote_addr: Option<SocketAddr>,
        outbound: mpsc::Sender<OutboundFrame>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: ConnectionId::new(),
                path: path.into(),
                remote_addr,
                connected_at: Utc::now(),
                slot: Mutex::new(Slot {
                    state: ConnectionState::Connecting,
                    binding: None,
                }),
                dispatch_guard: tokio::sync::Mutex::new(()),
                outbound,
            }),
        }
    }

    /// Creates a context together with the receiving end of its outbound
    /// queue.
    #[must_use]
    pub fn channel(
        path: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(path, None, tx), rx)
    }

    /// Connection identifier.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Request path the client connected to.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Peer address, when the transport knows it.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr
    }

    /// Time the upgrade request arrived.
    #[must_use]
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.inner.connected_at
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.slot.lock().state
    }

    /// Path of the module this connection is bound to, if open.
    #[must_use]
    pub fn bound_module(&self) -> Option<String> {
        self.inner
            .slot
            .lock()
            .binding
            .as_ref()
            .map(|b| b.path.clone())
    }

    /// Queues a frame for the peer.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Closed`] if the writer side has shut down.
    pub async fn send(&self, frame: OutboundFrame) -> Result<(), SendError> {
        self.inner
            .outbound
            .send(frame)
            .await
            .map_err(|_| SendError::Closed(self.id()))
    }

    /// Queues a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Closed`] if the writer side has shut down.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), SendError> {
        self.send(OutboundFrame::Text(text.into())).await
    }

    /// Queues a binary frame.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Closed`] if the writer side has shut down.
    pub async fn send_binary(&self, bytes: Vec<u8>) -> Result<(), SendError> {
        self.send(OutboundFrame::Binary(bytes)).await
    }

    /// Encodes `(command, body)` with the bound module's codec and queues it.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::NotBound`] before the connection opens,
    /// [`SendError::Encode`] if the codec cannot represent the reply, and
    /// [`SendError::Closed`] if the writer side has shut down.
    pub async fn reply(&self, command: &str, body: &Body) -> Result<(), SendError> {
        let codec = self
            .codec()
            .ok_or_else(|| SendError::NotBound(self.id()))?;
        let payload = codec.encode(command, body)?;
        self.send(payload.into()).await
    }

    /// Asks the transport to close the connection with `code`.
    ///
    /// The lifecycle moves to `Closed` once the transport reports the close.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Closed`] if the writer side has shut down.
    pub async fn close(&self, code: u16, reason: impl Into<String>) -> Result<(), SendError> {
        self.send(OutboundFrame::Close {
            code,
            reason: reason.into(),
        })
        .await
    }

    /// Codec of the bound module.
    #[must_use]
    pub fn codec(&self) -> Option<Arc<dyn Codec>> {
        self.inner
            .slot
            .lock()
            .binding
            .as_ref()
            .map(|b| Arc::clone(&b.codec))
    }

    /// Serializes dispatches on this connection.
    pub(crate) async fn lock_dispatch(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.inner.dispatch_guard.lock().await
    }

    /// Moves from one of `allowed` to `next`, returning the previous state.
    pub(crate) fn transition(
        &self,
        event: &'static str,
        allowed: &[ConnectionState],
        next: ConnectionState,
    ) -> Result<ConnectionState, LifecycleError> {
        let mut slot = self.inner.slot.lock();
        let current = slot.state;
        if !allowed.contains(&current) {
            return Err(match current {
                ConnectionState::Closed => LifecycleError::ConnectionClosed(self.id()),
                state => LifecycleError::InvalidTransition {
                    connection: self.id(),
                    event,
                    state,
                },
            });
        }
        slot.state = next;
        if next == ConnectionState::Closed {
            slot.binding = None;
        }
        Ok(current)
    }

    /// Binds the connection to a module and marks it open.
    pub(crate) fn bind(&self, path: &str, codec: Arc<dyn Codec>) {
        let mut slot = self.inner.slot.lock();
        slot.state = ConnectionState::Open;
        slot.binding = Some(Binding {
            path: path.to_string(),
            codec,
        });
    }

    /// Returns the bound module path, or the lifecycle error explaining why
    /// there is none.
    pub(crate) fn require_open(&self) -> Result<String, LifecycleError> {
        let slot = self.inner.slot.lock();
        match (slot.state, slot.binding.as_ref()) {
            (ConnectionState::Open, Some(binding)) => Ok(binding.path.clone()),
            (ConnectionState::Closed, _) => Err(LifecycleError::ConnectionClosed(self.id())),
            _ => Err(LifecycleError::NoModuleBound(self.id())),
        }
    }

    /// Marks the connection closed and asks the writer to send a close frame
    /// without waiting for queue space.
    pub(crate) fn force_close(&self, code: u16, reason: &str) {
        {
            let mut slot = self.inner.slot.lock();
            slot.state = ConnectionState::Closed;
            slot.binding = None;
        }
        if self
            .inner
            .outbound
            .try_send(OutboundFrame::Close {
                code,
                reason: reason.to_string(),
            })
            .is_err()
        {
            tracing::debug!(connection = %self.id(), "close frame dropped, queue full or closed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;

    #[test]
    fn starts_connecting_and_unbound() {
        let (conn, _rx) = ConnectionContext::channel("/chat", 4);
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(conn.bound_module().is_none());
        assert_eq!(conn.path(), "/chat");
    }

    #[test]
    fn require_open_distinguishes_unbound_and_closed() {
        let (conn, _rx) = ConnectionContext::channel("/chat", 4);
        assert_eq!(
            conn.require_open(),
            Err(LifecycleError::NoModuleBound(conn.id()))
        );

        conn.bind("/chat", Arc::new(JsonCodec));
        assert_eq!(conn.require_open(), Ok("/chat".to_string()));

        let closed = conn.transition("close", &[ConnectionState::Open], ConnectionState::Closed);
        assert_eq!(closed, Ok(ConnectionState::Open));
        assert_eq!(
            conn.require_open(),
            Err(LifecycleError::ConnectionClosed(conn.id()))
        );
        assert!(conn.bound_module().is_none());
    }

    #[test]
    fn transition_rejects_disallowed_state() {
        let (conn, _rx) = ConnectionContext::channel("/chat", 4);
        let result = conn.transition("close", &[ConnectionState::Open], ConnectionState::Closed);
        assert!(matches!(
            result,
            Err(LifecycleError::InvalidTransition {
                state: ConnectionState::Connecting,
                ..
            })
        ));
        assert_eq!(conn.state(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn reply_uses_bound_codec() {
        let (conn, mut rx) = ConnectionContext::channel("/chat", 4);
        assert_eq!(
            conn.reply("pong", &Body::Empty).await,
            Err(SendError::NotBound(conn.id()))
        );

        conn.bind("/chat", Arc::new(JsonCodec));
        assert!(conn.reply("pong", &Body::Empty).await.is_ok());
        let Some(OutboundFrame::Text(text)) = rx.recv().await else {
            panic!("expected a text frame");
        };
        assert!(text.contains("\"cmd\":\"pong\""));
    }

    #[tokio::test]
    async fn send_after_receiver_dropped_fails() {
        let (conn, rx) = ConnectionContext::channel("/chat", 4);
        drop(rx);
        assert_eq!(
            conn.send_text("hi").await,
            Err(SendError::Closed(conn.id()))
        );
    }

    #[tokio::test]
    async fn force_close_queues_close_frame() {
        let (conn, mut rx) = ConnectionContext::channel("/chat", 4);
        conn.bind("/chat", Arc::new(JsonCodec));
        conn.force_close(1011, "boom");
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(
            rx.recv().await,
            Some(OutboundFrame::Close {
                code: 1011,
                reason: "boom".to_string()
            })
        );
    }
}
