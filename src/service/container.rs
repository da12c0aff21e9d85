//! Handler traits and the instance container the dispatcher pulls live
//! instances from.
//!
//! The routing core never constructs controllers, handler objects or module
//! instances itself. It asks an [`InstanceContainer`] for them by
//! [`ClassId`]. [`InstanceRegistry`] is a ready-made container that builds
//! each class lazily from a registered factory and then reuses the same
//! instance for the rest of the process, like a singleton bean.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use futures_util::future::BoxFuture;
use parking_lot::RwLock;

use crate::domain::{Body, ClassId, Payload};
use crate::error::{ContainerError, DecodeError};
use crate::ws::ConnectionContext;

/// Result type returned by every handler.
pub type HandlerResult = anyhow::Result<()>;

/// A free-standing route target.
pub type InvocableFn =
    Arc<dyn Fn(Body, ConnectionContext) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Wraps an async function or closure as an [`InvocableFn`].
pub fn invocable<F, Fut>(f: F) -> InvocableFn
where
    F: Fn(Body, ConnectionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |body, conn| Box::pin(f(body, conn)))
}

/// A controller: a group of command methods under one module.
#[async_trait]
pub trait Controller: Send + Sync {
    /// Runs `method` with the decoded body.
    ///
    /// # Errors
    ///
    /// Any error is reported as a handler error for the command; the
    /// connection stays open.
    async fn invoke(&self, method: &str, body: Body, conn: ConnectionContext) -> HandlerResult;
}

/// A dedicated command class with a single entry point.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handles one command.
    ///
    /// # Errors
    ///
    /// Any error is reported as a handler error for the command; the
    /// connection stays open.
    async fn execute(&self, body: Body, conn: ConnectionContext) -> HandlerResult;
}

/// Upgrade request details handed to the handshake hook.
#[derive(Debug, Clone, Default)]
pub struct HandshakeRequest {
    /// Request path.
    pub path: String,
    /// Raw query string, without the leading `?`.
    pub query: Option<String>,
    /// Request headers.
    pub headers: HeaderMap,
}

/// Result of a handshake check: whether to accept, plus response changes.
#[derive(Debug, Clone)]
pub struct HandshakeDecision {
    /// Accept the upgrade.
    pub accept: bool,
    /// Status to use when refusing; ignored on accept.
    pub status: StatusCode,
    /// Headers added to the response either way.
    pub headers: HeaderMap,
    /// Reason reported to the client when refusing.
    pub reason: Option<String>,
}

impl HandshakeDecision {
    /// Accepts the upgrade without changes.
    #[must_use]
    pub fn accept() -> Self {
        Self {
            accept: true,
            status: StatusCode::SWITCHING_PROTOCOLS,
            headers: HeaderMap::new(),
            reason: None,
        }
    }

    /// Refuses the upgrade with `status`.
    #[must_use]
    pub fn reject(status: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            accept: false,
            status,
            headers: HeaderMap::new(),
            reason: Some(reason.into()),
        }
    }
}

/// Lifecycle hooks implemented by a module class.
///
/// Each hook receives the method name bound with `bind_event`, so one type
/// can serve several differently-wired modules. Defaults accept the
/// handshake and ignore everything else.
#[async_trait]
pub trait ModuleHooks: Send + Sync {
    /// Inspects the upgrade request.
    async fn check_handshake(
        &self,
        _method: &str,
        _request: &HandshakeRequest,
    ) -> HandshakeDecision {
        HandshakeDecision::accept()
    }

    /// Called once the connection is open and bound.
    async fn on_open(&self, _method: &str, _conn: ConnectionContext) {}

    /// Called when the connection closes.
    async fn on_close(&self, _method: &str, _conn: ConnectionContext) {}

    /// Receives raw frames when a `message` hook is bound.
    ///
    /// # Errors
    ///
    /// Errors are reported as handler errors for the frame.
    async fn on_message(
        &self,
        _method: &str,
        _payload: Payload,
        _conn: ConnectionContext,
    ) -> HandlerResult {
        Ok(())
    }

    /// Called when a frame cannot be decoded, if format errors are reported.
    /// The default replies with an `error` command carrying the error code
    /// and message.
    async fn on_format_error(&self, error: &DecodeError, conn: ConnectionContext) {
        report_format_error(&conn, error).await;
    }
}

/// Replies `error` with `{ code, message }` describing `error`.
pub async fn report_format_error(conn: &ConnectionContext, error: &DecodeError) {
    let body = Body::Json(serde_json::json!({
        "code": error.error_code(),
        "message": error.to_string(),
    }));
    if let Err(e) = conn.reply("error", &body).await {
        tracing::debug!(connection = %conn.id(), error = %e, "format error not reported");
    }
}

/// Supplies live instances by class.
pub trait InstanceContainer: Send + Sync {
    /// Returns the controller instance for `class`.
    ///
    /// # Errors
    ///
    /// Returns a [`ContainerError`] if the class is unknown or cannot be
    /// built.
    fn get_or_create_controller(
        &self,
        class: &ClassId,
    ) -> Result<Arc<dyn Controller>, ContainerError>;

    /// Returns the command handler instance for `class`.
    ///
    /// # Errors
    ///
    /// Returns a [`ContainerError`] if the class is unknown or cannot be
    /// built.
    fn get_or_create_handler(
        &self,
        class: &ClassId,
    ) -> Result<Arc<dyn CommandHandler>, ContainerError>;

    /// Returns the module hooks instance for `class`.
    ///
    /// # Errors
    ///
    /// Returns a [`ContainerError`] if the class is unknown or cannot be
    /// built.
    fn get_or_create_module(
        &self,
        class: &ClassId,
    ) -> Result<Arc<dyn ModuleHooks>, ContainerError>;
}

type Factory<T> = Box<dyn Fn() -> anyhow::Result<Arc<T>> + Send + Sync>;

/// Lazily-built instances of one kind, keyed by class.
struct Slots<T: ?Sized> {
    factories: HashMap<ClassId, Factory<T>>,
    instances: RwLock<HashMap<ClassId, Arc<T>>>,
}

impl<T: ?Sized> Default for Slots<T> {
    fn default() -> Self {
        Self {
            factories: HashMap::new(),
            instances: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: ?Sized> Slots<T> {
    fn get_or_create(&self, class: &ClassId) -> Result<Arc<T>, ContainerError> {
        if let Some(instance) = self.instances.read().get(class) {
            return Ok(Arc::clone(instance));
        }
        let factory = self
            .factories
            .get(class)
            .ok_or_else(|| ContainerError::UnknownClass(class.clone()))?;

        let mut instances = self.instances.write();
        if let Some(instance) = instances.get(class) {
            return Ok(Arc::clone(instance));
        }
        let instance = factory().map_err(|e| ContainerError::Construction {
            class: class.clone(),
            reason: e.to_string(),
        })?;
        tracing::debug!(%class, "instance created");
        instances.insert(class.clone(), Arc::clone(&instance));
        Ok(instance)
    }
}

/// Singleton container backed by registered factories.
///
/// Registration happens at startup through `&mut self`; lookups afterwards
/// only take the internal lock while creating a missing instance.
#[derive(Default)]
pub struct InstanceRegistry {
    controllers: Slots<dyn Controller>,
    handlers: Slots<dyn CommandHandler>,
    modules: Slots<dyn ModuleHooks>,
}

impl InstanceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a controller factory.
    pub fn register_controller<F>(&mut self, class: impl Into<ClassId>, factory: F)
    where
        F: Fn() -> anyhow::Result<Arc<dyn Controller>> + Send + Sync + 'static,
    {
        self.controllers
            .factories
            .insert(class.into(), Box::new(factory));
    }

    /// Registers a command handler factory.
    pub fn register_handler<F>(&mut self, class: impl Into<ClassId>, factory: F)
    where
        F: Fn() -> anyhow::Result<Arc<dyn CommandHandler>> + Send + Sync + 'static,
    {
        self.handlers
            .factories
            .insert(class.into(), Box::new(factory));
    }

    /// Registers a module hooks factory.
    pub fn register_module<F>(&mut self, class: impl Into<ClassId>, factory: F)
    where
        F: Fn() -> anyhow::Result<Arc<dyn ModuleHooks>> + Send + Sync + 'static,
    {
        self.modules.factories.insert(class.into(), Box::new(factory));
    }
}

impl InstanceContainer for InstanceRegistry {
    fn get_or_create_controller(
        &self,
        class: &ClassId,
    ) -> Result<Arc<dyn Controller>, ContainerError> {
        self.controllers.get_or_create(class)
    }

    fn get_or_create_handler(
        &self,
        class: &ClassId,
    ) -> Result<Arc<dyn CommandHandler>, ContainerError> {
        self.handlers.get_or_create(class)
    }

    fn get_or_create_module(
        &self,
        class: &ClassId,
    ) -> Result<Arc<dyn ModuleHooks>, ContainerError> {
        self.modules.get_or_create(class)
    }
}

impl fmt::Debug for InstanceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("controllers", &self.controllers.factories.len())
            .field("handlers", &self.handlers.factories.len())
            .field("modules", &self.modules.factories.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Noop;

    #[async_trait]
    impl Controller for Noop {
        async fn invoke(
            &self,
            _method: &str,
            _body: Body,
            _conn: ConnectionContext,
        ) -> HandlerResult {
            Ok(())
        }
    }

    #[test]
    fn instances_are_singletons() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let mut registry = InstanceRegistry::new();
        registry.register_controller("Noop", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Noop) as Arc<dyn Controller>)
        });

        let class = ClassId::new("Noop");
        let Ok(a) = registry.get_or_create_controller(&class) else {
            panic!("first lookup failed");
        };
        let Ok(b) = registry.get_or_create_controller(&class) else {
            panic!("second lookup failed");
        };
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_class_is_reported() {
        let registry = InstanceRegistry::new();
        let result = registry.get_or_create_handler(&ClassId::new("Missing"));
        assert!(matches!(result, Err(ContainerError::UnknownClass(_))));
    }

    #[test]
    fn factory_failure_is_construction_error() {
        let mut registry = InstanceRegistry::new();
        registry.register_module("Broken", || Err(anyhow::anyhow!("no config")));
        let result = registry.get_or_create_module(&ClassId::new("Broken"));
        let Err(ContainerError::Construction { reason, .. }) = result else {
            panic!("expected construction error");
        };
        assert_eq!(reason, "no config");
    }

    #[tokio::test]
    async fn invocable_wraps_async_closure() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let f = invocable(move |_body, _conn| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let (conn, _rx) = ConnectionContext::channel("/t", 1);
        assert!(f(Body::Empty, conn).await.is_ok());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_hooks_accept_handshake() {
        struct Plain;
        impl ModuleHooks for Plain {}
        let request = HandshakeRequest::default();
        let decision = tokio_test::block_on(Plain.check_handshake("x", &request));
        assert!(decision.accept);
    }
}
