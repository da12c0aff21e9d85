//! Read/write loop for one upgraded WebSocket.
//!
//! Inbound data frames are handed to [`Lifecycle::notify_frame`] one at a
//! time in arrival order. Outbound frames queued on the
//! [`ConnectionContext`] are forwarded to the peer by a separate writer task,
//! so a handler replying to its own connection never blocks the read loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::context::{ConnectionContext, ConnectionState};
use crate::config::ServerConfig;
use crate::domain::{OutboundFrame, Payload};
use crate::service::{DispatchOutcome, Lifecycle};

/// Normal closure (RFC 6455).
const CLOSE_NORMAL: u16 = 1000;

/// How long the writer may keep flushing after the read side ends.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs the connection until the peer goes away or the server closes it.
pub async fn run_connection(
    socket: WebSocket,
    conn: ConnectionContext,
    outbound: mpsc::Receiver<OutboundFrame>,
    lifecycle: Arc<Lifecycle>,
    config: Arc<ServerConfig>,
) {
    let (ws_tx, mut ws_rx) = socket.split();
    let mut writer = tokio::spawn(write_loop(ws_tx, outbound));

    if lifecycle.notify_open(&conn).await.is_ok() {
        while let Some(msg) = ws_rx.next().await {
            let payload = match msg {
                Ok(Message::Text(text)) => Payload::Text(text.as_str().to_owned()),
                Ok(Message::Binary(bytes)) => Payload::Binary(bytes.to_vec()),
                Ok(Message::Close(_)) => break,
                Ok(Message::Ping(_) | Message::Pong(_)) => continue,
                Err(e) => {
                    tracing::debug!(connection = %conn.id(), error = %e, "websocket read failed");
                    break;
                }
            };

            match lifecycle.notify_frame(&conn, payload).await {
                Ok(DispatchOutcome::FormatError { error }) if config.notify_format_errors => {
                    lifecycle.notify_format_error(&conn, &error).await;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    }

    if conn.state() != ConnectionState::Closed {
        // Already logged by the lifecycle if it fails.
        let _ = lifecycle.notify_close(&conn).await;
    }
    conn.force_close(CLOSE_NORMAL, "");
    drop(conn);

    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        tracing::warn!("writer did not drain in time, aborting");
        writer.abort();
    }
}

async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<OutboundFrame>,
) {
    while let Some(frame) = outbound.recv().await {
        let closing = matches!(frame, OutboundFrame::Close { .. });
        if ws_tx.send(into_message(frame)).await.is_err() {
            break;
        }
        if closing {
            return;
        }
    }
    let _ = ws_tx.close().await;
}

fn into_message(frame: OutboundFrame) -> Message {
    match frame {
        OutboundFrame::Text(text) => Message::text(text),
        OutboundFrame::Binary(bytes) => Message::binary(bytes),
        OutboundFrame::Close { code, reason } => Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })),
    }
}
