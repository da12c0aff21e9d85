//! `/chat`: JSON envelope chat room.
//!
//! | Command      | Target                | Reply                         |
//! |--------------|-----------------------|-------------------------------|
//! | `echo`       | `echo` method         | `echo` with the same body     |
//! | `ping`       | `doPing` method       | `pong`                        |
//! | `broadcast`  | `broadcast` method    | `message` to every chat peer  |
//! | `login`      | [`LoginHandler`]      | `login` with the greeting     |
//! | `time`       | `demo::time` function | `time` with an RFC 3339 stamp |
//!
//! Unknown or missing commands fall back to `echo`. Handshakes carrying
//! `deny=1` in the query are refused with 403.

use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use axum::http::{HeaderValue, StatusCode};
use chrono::Utc;
use serde_json::json;

use crate::domain::{Body, OutboundFrame};
use crate::error::DecodeError;
use crate::service::{
    CommandHandler, Controller, HandlerResult, HandshakeDecision, HandshakeRequest, ModuleHooks,
};
use crate::ws::{ConnectionContext, SessionRegistry};

/// Module class.
pub const MODULE: &str = "demo::ChatModule";
/// Controller class.
pub const CONTROLLER: &str = "demo::ChatController";
/// Execute-object handler class.
pub const LOGIN_HANDLER: &str = "demo::LoginHandler";
/// Invocable name.
pub const TIME_FN: &str = "demo::time";

/// Lifecycle hooks of the chat module.
#[derive(Debug, Default)]
pub struct ChatModule;

#[async_trait]
impl ModuleHooks for ChatModule {
    async fn check_handshake(
        &self,
        _method: &str,
        request: &HandshakeRequest,
    ) -> HandshakeDecision {
        let denied = request
            .query
            .as_deref()
            .is_some_and(|q| q.split('&').any(|pair| pair == "deny=1"));
        if denied {
            return HandshakeDecision::reject(StatusCode::FORBIDDEN, "chat access denied");
        }
        let mut decision = HandshakeDecision::accept();
        decision
            .headers
            .insert("x-chat-room", HeaderValue::from_static("lobby"));
        decision
    }

    async fn on_open(&self, _method: &str, conn: ConnectionContext) {
        let body = Body::Json(json!({ "connection": conn.id().to_string() }));
        if let Err(e) = conn.reply("welcome", &body).await {
            tracing::debug!(connection = %conn.id(), error = %e, "welcome not sent");
        }
    }

    async fn on_close(&self, _method: &str, conn: ConnectionContext) {
        tracing::debug!(connection = %conn.id(), "left chat");
    }

    async fn on_format_error(&self, error: &DecodeError, conn: ConnectionContext) {
        let body = Body::Json(json!({
            "code": error.error_code(),
            "message": "your sent data format is invalid",
        }));
        if let Err(e) = conn.reply("error", &body).await {
            tracing::debug!(connection = %conn.id(), error = %e, "format error not reported");
        }
    }
}

/// Command methods of the chat module.
#[derive(Debug)]
pub struct ChatController {
    sessions: Arc<SessionRegistry>,
}

impl ChatController {
    /// Creates the controller with access to open sessions for broadcasts.
    #[must_use]
    pub const fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self { sessions }
    }

    async fn broadcast(&self, body: Body, conn: &ConnectionContext) -> HandlerResult {
        let codec = conn.codec().context("connection is not bound")?;
        let path = conn.bound_module().context("connection is not bound")?;
        let frame = OutboundFrame::from(codec.encode("message", &body)?);
        let delivered = self.sessions.broadcast(&path, &frame).await;
        tracing::debug!(connection = %conn.id(), delivered, "chat message broadcast");
        Ok(())
    }
}

#[async_trait]
impl Controller for ChatController {
    async fn invoke(&self, method: &str, body: Body, conn: ConnectionContext) -> HandlerResult {
        match method {
            "echo" => conn.reply("echo", &body).await?,
            "doPing" => conn.reply("pong", &Body::Empty).await?,
            "broadcast" => self.broadcast(body, &conn).await?,
            other => anyhow::bail!("ChatController has no method {other}"),
        }
        Ok(())
    }
}

/// Greets a named user; `{"name": "..."}` is required.
#[derive(Debug, Default)]
pub struct LoginHandler;

#[async_trait]
impl CommandHandler for LoginHandler {
    async fn execute(&self, body: Body, conn: ConnectionContext) -> HandlerResult {
        let name = body
            .as_json()
            .and_then(|v| v.get("name"))
            .and_then(serde_json::Value::as_str)
            .context("login requires a name")?;
        conn.reply("login", &Body::Json(json!({ "greeting": format!("hello, {name}") })))
            .await?;
        Ok(())
    }
}

/// Replies with the current server time.
///
/// # Errors
///
/// Fails if the reply cannot be queued.
pub async fn time(_body: Body, conn: ConnectionContext) -> HandlerResult {
    let now = Body::Json(json!({ "now": Utc::now().to_rfc3339() }));
    conn.reply("time", &now).await?;
    Ok(())
}
