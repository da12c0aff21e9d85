//! Connection lifecycle: handshake, open, frame, close.
//!
//! [`Lifecycle`] is what the transport talks to. It owns the frozen route
//! table, the dispatcher and the session registry, drives each
//! [`ConnectionContext`] through its state machine and runs the module's
//! lifecycle hooks.
//!
//! Lifecycle violations (a frame before open, an event after close, an
//! event in the wrong state) are bugs in the caller. They are logged at
//! `error`, the offending connection is closed with code 1011 and the error
//! is returned; no other connection is affected.

use std::sync::Arc;

use axum::http::StatusCode;

use super::container::{
    HandshakeDecision, HandshakeRequest, InstanceContainer, ModuleHooks, report_format_error,
};
use super::dispatcher::{DispatchOutcome, MessageDispatcher, guarded};
use crate::domain::{ModuleDescriptor, ModuleEvent, Payload, RouteTable};
use crate::error::{CLOSE_INTERNAL_ERROR, DecodeError, LifecycleError};
use crate::ws::ConnectionContext;
use crate::ws::context::ConnectionState;
use crate::ws::sessions::SessionRegistry;

/// Entry point for transport events.
pub struct Lifecycle {
    table: Arc<RouteTable>,
    container: Arc<dyn InstanceContainer>,
    dispatcher: MessageDispatcher,
    sessions: Arc<SessionRegistry>,
}

impl Lifecycle {
    /// Creates a lifecycle manager over a frozen route table.
    #[must_use]
    pub fn new(table: Arc<RouteTable>, container: Arc<dyn InstanceContainer>) -> Self {
        Self::with_sessions(table, container, Arc::new(SessionRegistry::new()))
    }

    /// Like [`Self::new`], sharing an existing session registry so handlers
    /// built before the lifecycle can reach other connections.
    #[must_use]
    pub fn with_sessions(
        table: Arc<RouteTable>,
        container: Arc<dyn InstanceContainer>,
        sessions: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            dispatcher: MessageDispatcher::new(Arc::clone(&table), Arc::clone(&container)),
            table,
            container,
            sessions,
        }
    }

    /// The route table connections are resolved against.
    #[must_use]
    pub const fn table(&self) -> &Arc<RouteTable> {
        &self.table
    }

    /// Connections between open and close.
    #[must_use]
    pub const fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// The frame dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &MessageDispatcher {
        &self.dispatcher
    }

    /// Checks an upgrade request for `conn`.
    ///
    /// An unknown path is refused with 404. Otherwise the module's handshake
    /// hook decides; without a hook the request is accepted. A refused
    /// connection moves to `Closed`, an accepted one waits in
    /// `HandshakeChecking` for [`Self::notify_open`].
    ///
    /// # Errors
    ///
    /// Returns a [`LifecycleError`] if `conn` is not in the `Connecting`
    /// state.
    pub async fn notify_handshake(
        &self,
        conn: &ConnectionContext,
        request: &HandshakeRequest,
    ) -> Result<HandshakeDecision, LifecycleError> {
        if let Err(e) = conn.transition(
            "handshake",
            &[ConnectionState::Connecting],
            ConnectionState::HandshakeChecking,
        ) {
            return Err(self.violation(conn, e).await);
        }

        let decision = match self.table.get_module(&request.path) {
            None => HandshakeDecision::reject(
                StatusCode::NOT_FOUND,
                format!("no websocket module is bound to {}", request.path),
            ),
            Some(module) => self.check_handshake(module, request).await,
        };

        if decision.accept {
            tracing::debug!(connection = %conn.id(), path = %request.path, "handshake accepted");
        } else {
            tracing::info!(
                connection = %conn.id(),
                path = %request.path,
                status = decision.status.as_u16(),
                reason = decision.reason.as_deref().unwrap_or_default(),
                "handshake rejected"
            );
            if let Err(e) = conn.transition(
                "reject",
                &[ConnectionState::HandshakeChecking],
                ConnectionState::Closed,
            ) {
                tracing::error!(
                    connection = %conn.id(),
                    error = %e,
                    "rejected handshake left open"
                );
            }
        }
        Ok(decision)
    }

    /// Binds `conn` to the module at its path, registers it and runs the
    /// module's open hook.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NoModuleBound`] if no module serves the
    /// connection's path, [`LifecycleError::ConnectionClosed`] if it already
    /// closed and [`LifecycleError::InvalidTransition`] if it is already open.
    pub async fn notify_open(&self, conn: &ConnectionContext) -> Result<(), LifecycleError> {
        let Some(module) = self.table.get_module(conn.path()) else {
            return Err(self
                .violation(conn, LifecycleError::NoModuleBound(conn.id()))
                .await);
        };
        if let Err(e) = conn.transition(
            "open",
            &[
                ConnectionState::Connecting,
                ConnectionState::HandshakeChecking,
            ],
            ConnectionState::Open,
        ) {
            return Err(self.violation(conn, e).await);
        }
        conn.bind(module.path(), Arc::clone(module.codec()));
        self.sessions.insert(conn.clone()).await;
        tracing::info!(
            connection = %conn.id(),
            module = %module.path(),
            remote = ?conn.remote_addr(),
            "connection opened"
        );

        if let Some((hooks, method)) = self.hooks_for(module, ModuleEvent::Open) {
            let conn = conn.clone();
            if let Err(panic) = guarded(async move { hooks.on_open(method, conn).await }).await {
                tracing::warn!(module = %module.path(), error = %panic, "open hook failed");
            }
        }
        Ok(())
    }

    /// Runs the close hook (if the connection was open), unbinds `conn` and
    /// moves it to `Closed`.
    ///
    /// Waits for an in-flight dispatch on the same connection to finish.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::ConnectionClosed`] if the connection was
    /// already closed.
    pub async fn notify_close(&self, conn: &ConnectionContext) -> Result<(), LifecycleError> {
        let _guard = conn.lock_dispatch().await;

        if let Some(path) = conn.bound_module()
            && let Some(module) = self.table.get_module(&path)
            && let Some((hooks, method)) = self.hooks_for(module, ModuleEvent::Close)
        {
            let hook_conn = conn.clone();
            if let Err(panic) =
                guarded(async move { hooks.on_close(method, hook_conn).await }).await
            {
                tracing::warn!(module = %path, error = %panic, "close hook failed");
            }
        }

        let closed = conn.transition(
            "close",
            &[
                ConnectionState::Connecting,
                ConnectionState::HandshakeChecking,
                ConnectionState::Open,
            ],
            ConnectionState::Closed,
        );
        self.sessions.remove(conn.id()).await;
        match closed {
            Ok(_) => {
                tracing::info!(connection = %conn.id(), "connection closed");
                Ok(())
            }
            Err(e) => Err(self.violation(conn, e).await),
        }
    }

    /// Dispatches one inbound data frame.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NoModuleBound`] before open and
    /// [`LifecycleError::ConnectionClosed`] after close; the connection is
    /// then force-closed.
    pub async fn notify_frame(
        &self,
        conn: &ConnectionContext,
        payload: Payload,
    ) -> Result<DispatchOutcome, LifecycleError> {
        match self.dispatcher.dispatch(conn, payload).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self.violation(conn, e).await),
        }
    }

    /// Reports an undecodable frame through the bound module's
    /// [`ModuleHooks::on_format_error`]. Modules without a hooks instance get
    /// the standard `error` reply.
    pub async fn notify_format_error(&self, conn: &ConnectionContext, error: &DecodeError) {
        let hooks = conn
            .bound_module()
            .and_then(|path| self.table.get_module(&path))
            .and_then(|module| self.container.get_or_create_module(module.class()).ok());
        let Some(hooks) = hooks else {
            report_format_error(conn, error).await;
            return;
        };
        let hook_conn = conn.clone();
        if let Err(panic) =
            guarded(async move { hooks.on_format_error(error, hook_conn).await }).await
        {
            tracing::warn!(connection = %conn.id(), error = %panic, "format error hook failed");
        }
    }

    async fn check_handshake(
        &self,
        module: &ModuleDescriptor,
        request: &HandshakeRequest,
    ) -> HandshakeDecision {
        let Some(method) = module.event_method(ModuleEvent::Handshake) else {
            return HandshakeDecision::accept();
        };
        let hooks = match self.container.get_or_create_module(module.class()) {
            Ok(hooks) => hooks,
            Err(e) => {
                tracing::error!(module = %module.path(), error = %e, "handshake hook unavailable");
                return HandshakeDecision::reject(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
        };
        guarded(async move { hooks.check_handshake(method, request).await })
            .await
            .unwrap_or_else(|panic| {
                tracing::error!(module = %module.path(), error = %panic, "handshake hook failed");
                HandshakeDecision::reject(StatusCode::INTERNAL_SERVER_ERROR, "handshake failed")
            })
    }

    fn hooks_for<'m>(
        &self,
        module: &'m ModuleDescriptor,
        event: ModuleEvent,
    ) -> Option<(Arc<dyn ModuleHooks>, &'m str)> {
        let method = module.event_method(event)?;
        match self.container.get_or_create_module(module.class()) {
            Ok(hooks) => Some((hooks, method)),
            Err(e) => {
                tracing::warn!(module = %module.path(), %event, error = %e, "hook skipped");
                None
            }
        }
    }

    async fn violation(&self, conn: &ConnectionContext, error: LifecycleError) -> LifecycleError {
        tracing::error!(
            connection = %conn.id(),
            code = error.error_code(),
            error = %error,
            "lifecycle violation, closing connection"
        );
        conn.force_close(CLOSE_INTERNAL_ERROR, &error.to_string());
        self.sessions.remove(conn.id()).await;
        error
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("table", &self.table)
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}
