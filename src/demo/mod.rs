//! Demo application wired into the server binary.
//!
//! [`register`] is the startup registration pass: modules first, then their
//! controllers, then commands and hooks, followed by the matching factories
//! in the instance container.

pub mod chat;
pub mod echo;

use std::sync::Arc;

use crate::codec::{JsonCodec, TextCodec};
use crate::domain::{ModuleDescriptor, RouteTable};
use crate::error::RegistrationError;
use crate::service::{CommandHandler, Controller, InstanceRegistry, ModuleHooks, invocable};
use crate::ws::SessionRegistry;

/// Builds the demo route table and the container serving it.
///
/// # Errors
///
/// Returns a [`RegistrationError`] if the bindings are inconsistent.
pub fn register(
    sessions: &Arc<SessionRegistry>,
) -> Result<(RouteTable, InstanceRegistry), RegistrationError> {
    let mut table = RouteTable::new();

    table.bind_module(
        "/chat",
        ModuleDescriptor::new(chat::MODULE)
            .with_name("chat")
            .with_codec(Arc::new(JsonCodec))
            .with_default_command("echo"),
    )?;
    table.bind_controller("/chat", chat::CONTROLLER, "chat")?;
    table.bind_command(chat::CONTROLLER, "echo", "")?;
    table.bind_command(chat::CONTROLLER, "doPing", "ping")?;
    table.bind_command(chat::CONTROLLER, "broadcast", "")?;
    table.bind_handler_class(chat::LOGIN_HANDLER);
    table.bind_target(chat::CONTROLLER, chat::LOGIN_HANDLER, "login")?;
    table.bind_invocable(chat::TIME_FN, invocable(chat::time));
    table.bind_target(chat::CONTROLLER, chat::TIME_FN, "time")?;
    table.bind_event(chat::MODULE, "checkHandshake", "handshake")?;
    table.bind_event(chat::MODULE, "onOpen", "open")?;
    table.bind_event(chat::MODULE, "onClose", "close")?;

    table.bind_module(
        "/echo",
        ModuleDescriptor::new(echo::ECHO_MODULE)
            .with_codec(Arc::new(TextCodec))
            .with_default_command("echo"),
    )?;
    table.bind_controller("/echo", echo::ECHO_CONTROLLER, "")?;
    table.bind_command(echo::ECHO_CONTROLLER, "echo", "")?;

    table.bind_module("/raw", ModuleDescriptor::new(echo::RAW_MODULE))?;
    table.bind_event(echo::RAW_MODULE, "onMessage", "message")?;

    let stats = table.stats();
    tracing::info!(
        modules = stats.modules,
        controllers = stats.controllers,
        commands = stats.commands,
        events = stats.events,
        handlers = stats.handlers,
        "routes registered"
    );

    let mut container = InstanceRegistry::new();
    container.register_module(chat::MODULE, || {
        Ok(Arc::new(chat::ChatModule) as Arc<dyn ModuleHooks>)
    });
    let shared = Arc::clone(sessions);
    container.register_controller(chat::CONTROLLER, move || {
        Ok(Arc::new(chat::ChatController::new(Arc::clone(&shared))) as Arc<dyn Controller>)
    });
    container.register_handler(chat::LOGIN_HANDLER, || {
        Ok(Arc::new(chat::LoginHandler) as Arc<dyn CommandHandler>)
    });
    container.register_controller(echo::ECHO_CONTROLLER, || {
        Ok(Arc::new(echo::EchoController) as Arc<dyn Controller>)
    });
    container.register_module(echo::RAW_MODULE, || {
        Ok(Arc::new(echo::RawModule) as Arc<dyn ModuleHooks>)
    });

    Ok((table, container))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{OutboundFrame, Payload};
    use crate::service::{DispatchOutcome, HandshakeRequest, Lifecycle};
    use crate::ws::ConnectionContext;

    fn demo() -> Lifecycle {
        let sessions = Arc::new(SessionRegistry::new());
        let Ok((table, container)) = register(&sessions) else {
            panic!("demo registration failed");
        };
        Lifecycle::with_sessions(Arc::new(table), Arc::new(container), sessions)
    }

    type Outbound = tokio::sync::mpsc::Receiver<OutboundFrame>;

    async fn open(lifecycle: &Lifecycle, path: &str) -> (ConnectionContext, Outbound) {
        let (conn, rx) = ConnectionContext::channel(path, 32);
        let Ok(()) = lifecycle.notify_open(&conn).await else {
            panic!("open failed");
        };
        (conn, rx)
    }

    async fn next_text(rx: &mut Outbound) -> String {
        let Some(OutboundFrame::Text(text)) = rx.recv().await else {
            panic!("expected a text frame");
        };
        text
    }

    #[test]
    fn registration_is_consistent() {
        let Ok((table, _)) = register(&Arc::new(SessionRegistry::new())) else {
            panic!("registration failed");
        };
        assert_eq!(table.stats().modules, 3);
        assert!(table.get_module("/chat").is_some());
        assert!(table.get_module("/raw").is_some());
    }

    #[tokio::test]
    async fn chat_routes_every_handler_kind() {
        let lifecycle = demo();
        let (conn, mut rx) = open(&lifecycle, "/chat").await;
        assert!(next_text(&mut rx).await.contains("\"cmd\":\"welcome\""));

        for (frame, expected) in [
            (r#"{"cmd":"ping"}"#, "\"cmd\":\"pong\""),
            (r#"{"cmd":"chat.ping"}"#, "\"cmd\":\"pong\""),
            (r#"{"cmd":"login","data":{"name":"ada"}}"#, "hello, ada"),
            (r#"{"cmd":"time"}"#, "\"now\""),
            (r#"{"data":"fallback"}"#, "\"data\":\"fallback\""),
        ] {
            let payload = Payload::Text(frame.to_string());
            let Ok(outcome) = lifecycle.notify_frame(&conn, payload).await else {
                panic!("lifecycle error for {frame}");
            };
            assert!(outcome.is_handled(), "{frame}: {outcome:?}");
            let reply = next_text(&mut rx).await;
            assert!(reply.contains(expected), "{frame}: {reply}");
        }
    }

    #[tokio::test]
    async fn chat_answers_bad_frames_with_its_own_message() {
        let lifecycle = demo();
        let (conn, mut rx) = open(&lifecycle, "/chat").await;
        next_text(&mut rx).await;

        let outcome = lifecycle
            .notify_frame(&conn, Payload::Text("not json".to_string()))
            .await;
        let Ok(DispatchOutcome::FormatError { error }) = outcome else {
            panic!("expected a format error");
        };
        lifecycle.notify_format_error(&conn, &error).await;
        let reply = next_text(&mut rx).await;
        assert!(reply.contains("your sent data format is invalid"), "{reply}");
    }

    #[tokio::test]
    async fn login_without_name_is_handler_error() {
        let lifecycle = demo();
        let (conn, _rx) = open(&lifecycle, "/chat").await;
        let outcome = lifecycle
            .notify_frame(&conn, Payload::Text(r#"{"cmd":"login"}"#.to_string()))
            .await;
        assert!(matches!(outcome, Ok(DispatchOutcome::HandlerError { .. })));
    }

    #[tokio::test]
    async fn broadcast_reaches_all_chat_peers() {
        let lifecycle = demo();
        let (alice, mut alice_rx) = open(&lifecycle, "/chat").await;
        let (_bob, mut bob_rx) = open(&lifecycle, "/chat").await;
        next_text(&mut alice_rx).await;
        next_text(&mut bob_rx).await;

        let frame = r#"{"cmd":"broadcast","data":"hi all"}"#.to_string();
        assert!(lifecycle.notify_frame(&alice, Payload::Text(frame)).await.is_ok());
        assert!(next_text(&mut alice_rx).await.contains("hi all"));
        assert!(next_text(&mut bob_rx).await.contains("\"cmd\":\"message\""));
    }

    #[tokio::test]
    async fn chat_handshake_honours_deny_query() {
        let lifecycle = demo();
        let (conn, _rx) = ConnectionContext::channel("/chat", 4);
        let request = HandshakeRequest {
            path: "/chat".to_string(),
            query: Some("deny=1".to_string()),
            ..HandshakeRequest::default()
        };
        let Ok(decision) = lifecycle.notify_handshake(&conn, &request).await else {
            panic!("handshake errored");
        };
        assert!(!decision.accept);
        assert_eq!(decision.status.as_u16(), 403);
    }

    #[tokio::test]
    async fn echo_and_raw_modules() {
        let lifecycle = demo();
        let (echo, mut echo_rx) = open(&lifecycle, "/echo").await;
        let plain = Payload::Text("plain".to_string());
        assert!(lifecycle.notify_frame(&echo, plain).await.is_ok());
        assert_eq!(next_text(&mut echo_rx).await, "plain");

        let (raw, mut raw_rx) = open(&lifecycle, "/raw").await;
        let outcome = lifecycle
            .notify_frame(&raw, Payload::Binary(vec![0, 159, 146, 150]))
            .await;
        assert!(matches!(outcome, Ok(ref o) if o.is_handled()));
        assert_eq!(
            raw_rx.recv().await,
            Some(OutboundFrame::Binary(vec![0, 159, 146, 150]))
        );
    }
}
