//! Axum WebSocket upgrade handler.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;

use super::connection::run_connection;
use super::context::ConnectionContext;
use crate::app_state::AppState;
use crate::error::HandshakeRejection;
use crate::service::HandshakeRequest;

/// `GET /{*path}`: upgrade to a WebSocket bound to the module at `path`.
///
/// The module's handshake hook runs before the upgrade is answered. A
/// refusal is returned as a plain HTTP error with the hook's status and
/// headers; on acceptance the hook's headers are added to the `101`
/// response.
pub async fn ws_handler(State(state): State<AppState>, request: Request) -> Response {
    let (mut parts, _body) = request.into_parts();
    let remote_addr = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let upgrade: WebSocketUpgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &state)
        .await
    {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    let handshake = HandshakeRequest {
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
    };
    let (outbound_tx, outbound_rx) = mpsc::channel(state.config.outbound_buffer.max(1));
    let conn = ConnectionContext::new(handshake.path.clone(), remote_addr, outbound_tx);

    let decision = match state.lifecycle.notify_handshake(&conn, &handshake).await {
        Ok(decision) => decision,
        Err(e) => {
            return HandshakeRejection::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                .into_response();
        }
    };
    if !decision.accept {
        let mut rejection = HandshakeRejection::new(
            decision.status,
            decision
                .reason
                .unwrap_or_else(|| "handshake rejected".to_string()),
        );
        rejection.headers = decision.headers;
        return rejection.into_response();
    }

    let lifecycle = Arc::clone(&state.lifecycle);
    let config = Arc::clone(&state.config);
    let connection_id = conn.id();
    let mut response = upgrade
        .max_message_size(state.config.max_frame_bytes)
        .on_failed_upgrade(move |error| {
            tracing::warn!(connection = %connection_id, %error, "websocket upgrade failed");
        })
        .on_upgrade(move |socket| run_connection(socket, conn, outbound_rx, lifecycle, config));
    response.headers_mut().extend(decision.headers);
    response
}
