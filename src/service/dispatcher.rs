//! Per-frame dispatch: decode, resolve, invoke.
//!
//! [`MessageDispatcher::dispatch`] is the runtime entry point for every
//! inbound data frame. Failures inside a frame (bad payload, unknown command,
//! handler error or panic) come back as a [`DispatchOutcome`]; only lifecycle
//! misuse is returned as an error.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use super::container::{HandlerResult, InstanceContainer};
use super::resolver::{HandlerRef, Resolver};
use crate::domain::{Body, ModuleDescriptor, ModuleEvent, Payload, RouteTable};
use crate::error::{DecodeError, LifecycleError, ResolutionError};
use crate::ws::ConnectionContext;

/// Typed result of processing one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler ran to completion.
    Handled {
        /// Command that was invoked (after default substitution), or the
        /// module's message hook method.
        command: String,
    },
    /// The module's codec could not decode the frame.
    FormatError {
        /// Codec error.
        error: DecodeError,
    },
    /// No handler could be resolved.
    CommandError {
        /// Command as decoded from the frame.
        command: String,
        /// Resolution failure.
        error: ResolutionError,
    },
    /// The handler failed or panicked.
    HandlerError {
        /// Command that was invoked.
        command: String,
        /// Error message, including its cause chain.
        message: String,
    },
}

impl DispatchOutcome {
    /// Short tag for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Handled { .. } => "handled",
            Self::FormatError { .. } => "format_error",
            Self::CommandError { .. } => "command_error",
            Self::HandlerError { .. } => "handler_error",
        }
    }

    /// Returns `true` for [`DispatchOutcome::Handled`].
    #[must_use]
    pub const fn is_handled(&self) -> bool {
        matches!(self, Self::Handled { .. })
    }
}

/// Routes frames of open connections to their handlers.
#[derive(Clone)]
pub struct MessageDispatcher {
    table: Arc<RouteTable>,
    resolver: Resolver,
    container: Arc<dyn InstanceContainer>,
}

impl MessageDispatcher {
    /// Creates a dispatcher over a frozen route table.
    #[must_use]
    pub fn new(table: Arc<RouteTable>, container: Arc<dyn InstanceContainer>) -> Self {
        Self {
            resolver: Resolver::new(Arc::clone(&table)),
            table,
            container,
        }
    }

    /// Dispatches one frame received on `conn`.
    ///
    /// Frames on the same connection are processed one at a time in the
    /// order this method is called; different connections do not block each
    /// other.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NoModuleBound`] if the connection was never
    /// opened and [`LifecycleError::ConnectionClosed`] if it has closed.
    pub async fn dispatch(
        &self,
        conn: &ConnectionContext,
        payload: Payload,
    ) -> Result<DispatchOutcome, LifecycleError> {
        let _guard = conn.lock_dispatch().await;
        let path = conn.require_open()?;
        let module = self
            .table
            .get_module(&path)
            .ok_or(LifecycleError::NoModuleBound(conn.id()))?;

        let outcome = match module.event_method(ModuleEvent::Message) {
            Some(method) => self.deliver_to_hook(module, method, payload, conn).await,
            None => self.route(module, payload, conn).await,
        };

        match &outcome {
            DispatchOutcome::HandlerError { command, message } => {
                tracing::warn!(
                    connection = %conn.id(),
                    module = %path,
                    command,
                    error = %message,
                    "handler failed"
                );
            }
            other => {
                tracing::debug!(
                    connection = %conn.id(),
                    module = %path,
                    outcome = other.kind(),
                    "frame dispatched"
                );
            }
        }
        Ok(outcome)
    }

    async fn route(
        &self,
        module: &ModuleDescriptor,
        payload: Payload,
        conn: &ConnectionContext,
    ) -> DispatchOutcome {
        let envelope = match module.codec().decode(&payload) {
            Ok(envelope) => envelope,
            Err(error) => {
                tracing::debug!(connection = %conn.id(), %error, "frame could not be decoded");
                return DispatchOutcome::FormatError { error };
            }
        };

        let resolution = match self.resolver.resolve(module, &envelope.command) {
            Ok(resolution) => resolution,
            Err(error) => {
                return DispatchOutcome::CommandError {
                    command: envelope.command,
                    error,
                };
            }
        };
        tracing::trace!(
            command = %resolution.command,
            handler = resolution.handler.kind(),
            "command resolved"
        );

        match self
            .invoke(&resolution.handler, envelope.body, conn.clone())
            .await
        {
            Ok(()) => DispatchOutcome::Handled {
                command: resolution.command,
            },
            Err(e) => DispatchOutcome::HandlerError {
                command: resolution.command,
                message: format!("{e:#}"),
            },
        }
    }

    async fn deliver_to_hook(
        &self,
        module: &ModuleDescriptor,
        method: &str,
        payload: Payload,
        conn: &ConnectionContext,
    ) -> DispatchOutcome {
        let result = match self.container.get_or_create_module(module.class()) {
            Ok(hooks) => {
                let conn = conn.clone();
                guarded(async move { hooks.on_message(method, payload, conn).await })
                    .await
                    .unwrap_or_else(|panic| Err(anyhow::anyhow!(panic)))
            }
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(()) => DispatchOutcome::Handled {
                command: method.to_string(),
            },
            Err(e) => DispatchOutcome::HandlerError {
                command: method.to_string(),
                message: format!("{e:#}"),
            },
        }
    }

    async fn invoke(
        &self,
        handler: &HandlerRef,
        body: Body,
        conn: ConnectionContext,
    ) -> HandlerResult {
        let call: BoxFuture<'_, HandlerResult> = match handler {
            HandlerRef::BoundMethod { controller, method } => {
                let instance = self.container.get_or_create_controller(controller)?;
                Box::pin(async move { instance.invoke(method, body, conn).await })
            }
            HandlerRef::ExecuteObject { class } => {
                let instance = self.container.get_or_create_handler(class)?;
                Box::pin(async move { instance.execute(body, conn).await })
            }
            HandlerRef::Invocable { handler, .. } => handler(body, conn),
        };
        guarded(call)
            .await
            .unwrap_or_else(|panic| Err(anyhow::anyhow!(panic)))
    }
}

impl std::fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageDispatcher")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

/// Runs `fut`, turning a panic into `Err` with the panic message.
pub(crate) async fn guarded<F, T>(fut: F) -> Result<T, String>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(|panic| format!("handler panicked: {}", panic_message(panic.as_ref())))
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::codec::TextCodec;
    use crate::domain::OutboundFrame;
    use crate::service::container::{
        CommandHandler, Controller, InstanceRegistry, ModuleHooks, invocable,
    };
    use crate::ws::context::ConnectionState;

    const MODULE: &str = "app::EchoModule";
    const CTRL: &str = "app::EchoController";

    struct EchoController;

    #[async_trait]
    impl Controller for EchoController {
        async fn invoke(&self, method: &str, body: Body, conn: ConnectionContext) -> HandlerResult {
            match method {
                "echo" => {
                    conn.send_text(format!("echo:{}", body.as_text().unwrap_or_default()))
                        .await?;
                    Ok(())
                }
                "fail" => Err(anyhow::anyhow!("boom")),
                "explode" => panic!("kaboom"),
                other => Err(anyhow::anyhow!("no method {other}")),
            }
        }
    }

    struct Shout;

    #[async_trait]
    impl CommandHandler for Shout {
        async fn execute(&self, body: Body, conn: ConnectionContext) -> HandlerResult {
            let text = body.as_text().unwrap_or_default().to_uppercase();
            conn.send_text(text).await?;
            Ok(())
        }
    }

    struct RawHooks {
        frames: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ModuleHooks for RawHooks {
        async fn on_message(
            &self,
            _method: &str,
            _payload: Payload,
            _conn: ConnectionContext,
        ) -> HandlerResult {
            self.frames.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn build(default_command: &str) -> (Arc<RouteTable>, MessageDispatcher) {
        let mut table = RouteTable::new();
        let module = ModuleDescriptor::new(MODULE)
            .with_codec(Arc::new(crate::codec::JsonCodec))
            .with_default_command(default_command);
        let Ok(()) = table.bind_module("/echo", module) else {
            panic!("bind_module failed");
        };
        let Ok(()) = table.bind_controller("/echo", CTRL, "") else {
            panic!("bind_controller failed");
        };
        for method in ["echo", "fail", "explode"] {
            let Ok(()) = table.bind_command(CTRL, method, "") else {
                panic!("bind_command failed");
            };
        }
        table.bind_handler_class("app::Shout");
        let Ok(()) = table.bind_target(CTRL, "app::Shout", "shout") else {
            panic!("bind_target failed");
        };
        table.bind_invocable(
            "ping",
            invocable(|_, conn: ConnectionContext| async move {
                conn.send_text("pong").await.map_err(anyhow::Error::from)
            }),
        );
        let Ok(()) = table.bind_target(CTRL, "ping", "ping") else {
            panic!("bind_target failed");
        };

        let mut container = InstanceRegistry::new();
        container.register_controller(CTRL, || Ok(Arc::new(EchoController) as Arc<dyn Controller>));
        container.register_handler("app::Shout", || Ok(Arc::new(Shout) as Arc<dyn CommandHandler>));

        let table = Arc::new(table);
        let dispatcher = MessageDispatcher::new(Arc::clone(&table), Arc::new(container));
        (table, dispatcher)
    }

    fn open_conn(
        table: &RouteTable,
    ) -> (ConnectionContext, tokio::sync::mpsc::Receiver<OutboundFrame>) {
        let (conn, rx) = ConnectionContext::channel("/echo", 64);
        let Some(module) = table.get_module("/echo") else {
            panic!("module missing");
        };
        conn.bind(module.path(), Arc::clone(module.codec()));
        (conn, rx)
    }

    fn json(text: &str) -> Payload {
        Payload::Text(text.to_string())
    }

    #[tokio::test]
    async fn bound_method_is_invoked() {
        let (table, dispatcher) = build("");
        let (conn, mut rx) = open_conn(&table);

        let outcome = dispatcher
            .dispatch(&conn, json(r#"{"cmd":"echo","data":"hi"}"#))
            .await;
        assert_eq!(
            outcome,
            Ok(DispatchOutcome::Handled {
                command: "echo".to_string()
            })
        );
        assert_eq!(rx.recv().await, Some(OutboundFrame::Text("echo:hi".to_string())));
    }

    #[tokio::test]
    async fn execute_object_is_invoked() {
        let (table, dispatcher) = build("");
        let (conn, mut rx) = open_conn(&table);

        let outcome = dispatcher
            .dispatch(&conn, json(r#"{"cmd":"shout","data":"hey"}"#))
            .await;
        assert!(matches!(outcome, Ok(ref o) if o.is_handled()));
        assert_eq!(rx.recv().await, Some(OutboundFrame::Text("HEY".to_string())));
    }

    #[tokio::test]
    async fn invocable_is_invoked() {
        let (table, dispatcher) = build("");
        let (conn, mut rx) = open_conn(&table);

        let outcome = dispatcher.dispatch(&conn, json(r#"{"cmd":"ping"}"#)).await;
        assert!(matches!(outcome, Ok(ref o) if o.is_handled()));
        assert_eq!(rx.recv().await, Some(OutboundFrame::Text("pong".to_string())));
    }

    #[tokio::test]
    async fn empty_command_dispatches_default() {
        let (table, dispatcher) = build("echo");
        let (conn, mut rx) = open_conn(&table);

        let outcome = dispatcher
            .dispatch(&conn, json(r#"{"cmd":"","data":"x"}"#))
            .await;
        assert_eq!(
            outcome,
            Ok(DispatchOutcome::Handled {
                command: "echo".to_string()
            })
        );
        assert_eq!(rx.recv().await, Some(OutboundFrame::Text("echo:x".to_string())));
    }

    #[tokio::test]
    async fn unknown_command_is_command_error_and_connection_stays_open() {
        let (table, dispatcher) = build("");
        let (conn, _rx) = open_conn(&table);

        let outcome = dispatcher.dispatch(&conn, json(r#"{"cmd":"nope"}"#)).await;
        assert_eq!(
            outcome,
            Ok(DispatchOutcome::CommandError {
                command: "nope".to_string(),
                error: ResolutionError::CommandNotFound {
                    command: "nope".to_string()
                },
            })
        );
        assert_eq!(conn.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn decode_failure_is_format_error_and_changes_nothing() {
        let (table, dispatcher) = build("");
        let (conn, _rx) = open_conn(&table);
        let stats_before = table.stats();

        let outcome = dispatcher.dispatch(&conn, json("{broken")).await;
        assert!(matches!(outcome, Ok(DispatchOutcome::FormatError { .. })));
        assert_eq!(table.stats(), stats_before);
        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(conn.bound_module(), Some("/echo".to_string()));
    }

    #[tokio::test]
    async fn handler_error_is_captured() {
        let (table, dispatcher) = build("");
        let (conn, _rx) = open_conn(&table);

        let outcome = dispatcher.dispatch(&conn, json(r#"{"cmd":"fail"}"#)).await;
        assert_eq!(
            outcome,
            Ok(DispatchOutcome::HandlerError {
                command: "fail".to_string(),
                message: "boom".to_string(),
            })
        );
        assert_eq!(conn.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn handler_panic_is_captured() {
        let (table, dispatcher) = build("");
        let (conn, _rx) = open_conn(&table);

        let outcome = dispatcher.dispatch(&conn, json(r#"{"cmd":"explode"}"#)).await;
        let Ok(DispatchOutcome::HandlerError { message, .. }) = outcome else {
            panic!("expected handler error");
        };
        assert!(message.contains("kaboom"));

        let next = dispatcher.dispatch(&conn, json(r#"{"cmd":"ping"}"#)).await;
        assert!(matches!(next, Ok(ref o) if o.is_handled()));
    }

    #[tokio::test]
    async fn missing_instance_is_handler_error() {
        let mut table = RouteTable::new();
        let Ok(()) = table.bind_module("/echo", ModuleDescriptor::new(MODULE)) else {
            panic!("bind_module failed");
        };
        let Ok(()) = table.bind_controller("/echo", CTRL, "") else {
            panic!("bind_controller failed");
        };
        let Ok(()) = table.bind_command(CTRL, "echo", "") else {
            panic!("bind_command failed");
        };
        let table = Arc::new(table);
        let empty = Arc::new(InstanceRegistry::new());
        let dispatcher = MessageDispatcher::new(Arc::clone(&table), empty);
        let (conn, _rx) = open_conn(&table);

        let outcome = dispatcher.dispatch(&conn, json(r#"{"cmd":"echo"}"#)).await;
        assert!(matches!(outcome, Ok(DispatchOutcome::HandlerError { .. })));
    }

    #[tokio::test]
    async fn unopened_connection_has_no_module() {
        let (_table, dispatcher) = build("");
        let (conn, _rx) = ConnectionContext::channel("/echo", 4);

        let outcome = dispatcher.dispatch(&conn, json(r#"{"cmd":"echo"}"#)).await;
        assert_eq!(outcome, Err(LifecycleError::NoModuleBound(conn.id())));
    }

    #[tokio::test]
    async fn message_hook_takes_raw_frames() {
        let frames = Arc::new(AtomicUsize::new(0));
        let mut table = RouteTable::new();
        let module = ModuleDescriptor::new("app::RawModule").with_codec(Arc::new(TextCodec));
        let Ok(()) = table.bind_module("/raw", module) else {
            panic!("bind_module failed");
        };
        let Ok(()) = table.bind_event("app::RawModule", "onMessage", "message") else {
            panic!("bind_event failed");
        };
        let mut container = InstanceRegistry::new();
        let counter = Arc::clone(&frames);
        container.register_module("app::RawModule", move || {
            Ok(Arc::new(RawHooks {
                frames: Arc::clone(&counter),
            }) as Arc<dyn ModuleHooks>)
        });
        let table = Arc::new(table);
        let dispatcher = MessageDispatcher::new(Arc::clone(&table), Arc::new(container));

        let (conn, _rx) = ConnectionContext::channel("/raw", 4);
        conn.bind("/raw", Arc::new(TextCodec));
        let outcome = dispatcher
            .dispatch(&conn, Payload::Binary(vec![0xff]))
            .await;
        assert_eq!(
            outcome,
            Ok(DispatchOutcome::Handled {
                command: "onMessage".to_string()
            })
        );
        assert_eq!(frames.load(Ordering::SeqCst), 1);
    }

    fn drain_text(rx: &mut tokio::sync::mpsc::Receiver<OutboundFrame>) -> Vec<String> {
        let mut seen = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            if let OutboundFrame::Text(text) = frame {
                seen.push(text);
            }
        }
        seen
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn connections_dispatch_independently_and_in_order() {
        let (table, dispatcher) = build("");
        let (first, mut first_rx) = ConnectionContext::channel("/echo", 256);
        let (second, mut second_rx) = ConnectionContext::channel("/echo", 256);
        for conn in [&first, &second] {
            let Some(module) = table.get_module("/echo") else {
                panic!("module missing");
            };
            conn.bind(module.path(), Arc::clone(module.codec()));
        }

        let spawn_burst = |conn: ConnectionContext, tag: &'static str| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                for i in 0..50 {
                    let frame = format!(r#"{{"cmd":"echo","data":"{tag}{i}"}}"#);
                    let Ok(outcome) = dispatcher.dispatch(&conn, Payload::Text(frame)).await else {
                        panic!("lifecycle error");
                    };
                    assert!(outcome.is_handled());
                }
            })
        };
        let a = spawn_burst(first.clone(), "a");
        let b = spawn_burst(second.clone(), "b");
        let (ra, rb) = tokio::join!(a, b);
        assert!(ra.is_ok() && rb.is_ok());

        let expected_a: Vec<String> = (0..50).map(|i| format!("echo:a{i}")).collect();
        let expected_b: Vec<String> = (0..50).map(|i| format!("echo:b{i}")).collect();
        assert_eq!(drain_text(&mut first_rx), expected_a);
        assert_eq!(drain_text(&mut second_rx), expected_b);
    }

    proptest::proptest! {
        #[test]
        fn interleaved_frames_keep_per_connection_order(
            frames in proptest::collection::vec((0_usize..3, 0_u16..1000), 1..48)
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build();
            let Ok(runtime) = runtime else {
                panic!("runtime");
            };
            runtime.block_on(async {
                let (table, dispatcher) = build("");
                let mut conns = Vec::new();
                for _ in 0..3 {
                    conns.push(open_conn(&table));
                }

                let mut expected: Vec<Vec<String>> = vec![Vec::new(); 3];
                for (index, value) in &frames {
                    let Some((conn, _)) = conns.get(*index) else {
                        panic!("index out of range");
                    };
                    let frame = format!(r#"{{"cmd":"echo","data":"{value}"}}"#);
                    let Ok(outcome) = dispatcher.dispatch(conn, Payload::Text(frame)).await else {
                        panic!("lifecycle error");
                    };
                    proptest::prop_assert!(outcome.is_handled());
                    if let Some(list) = expected.get_mut(*index) {
                        list.push(format!("echo:{value}"));
                    }
                }

                for ((conn, rx), want) in conns.iter_mut().zip(expected) {
                    proptest::prop_assert_eq!(conn.state(), ConnectionState::Open);
                    proptest::prop_assert_eq!(drain_text(rx), want);
                }
                Ok(())
            })?;
        }
    }

    #[test]
    fn panic_message_reads_str_and_string() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(s.as_ref()), "static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}
