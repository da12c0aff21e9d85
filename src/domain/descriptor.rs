//! Registration records: modules, controller bindings and routes.
//!
//! These are the facts the declaration-discovery pass reports about the
//! application. They are owned by [`super::RouteTable`] and never mutated
//! once registration has finished.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use super::ClassId;
use crate::codec::{Codec, JsonCodec};
use crate::error::RegistrationError;

/// Lifecycle hook a module can bind a method to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleEvent {
    /// Inspect the upgrade request and accept or refuse it.
    Handshake,
    /// Connection opened.
    Open,
    /// Connection closed.
    Close,
    /// Raw frame received; bypasses command routing when bound.
    Message,
}

impl ModuleEvent {
    /// Returns the canonical lowercase event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Handshake => "handshake",
            Self::Open => "open",
            Self::Close => "close",
            Self::Message => "message",
        }
    }
}

impl fmt::Display for ModuleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleEvent {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "handshake" => Ok(Self::Handshake),
            "open" => Ok(Self::Open),
            "close" => Ok(Self::Close),
            "message" => Ok(Self::Message),
            _ => Err(RegistrationError::UnknownEvent(s.to_string())),
        }
    }
}

/// One WebSocket endpoint.
///
/// Built by the discovery pass and handed to
/// [`super::RouteTable::bind_module`], which stamps in the path.
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    path: String,
    name: String,
    class: ClassId,
    default_command: String,
    codec: Arc<dyn Codec>,
    controllers: Vec<ClassId>,
    event_methods: BTreeMap<ModuleEvent, String>,
}

impl ModuleDescriptor {
    /// Creates a descriptor for `class` with the JSON codec, no default
    /// command and no controllers. The name defaults to the short class name.
    #[must_use]
    pub fn new(class: impl Into<ClassId>) -> Self {
        let class = class.into();
        Self {
            path: String::new(),
            name: class.short_name().to_string(),
            class,
            default_command: String::new(),
            codec: Arc::new(JsonCodec),
            controllers: Vec::new(),
            event_methods: BTreeMap::new(),
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the command used when a frame carries no recognizable command.
    #[must_use]
    pub fn with_default_command(mut self, command: impl Into<String>) -> Self {
        self.default_command = command.into();
        self
    }

    /// Sets the codec.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Declares controller classes up front, in resolution order.
    #[must_use]
    pub fn with_controllers<I, C>(mut self, controllers: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ClassId>,
    {
        for controller in controllers {
            self.push_controller(controller.into());
        }
        self
    }

    /// Module path, e.g. `/chat`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning module class.
    #[must_use]
    pub const fn class(&self) -> &ClassId {
        &self.class
    }

    /// Default command; empty when none is configured.
    #[must_use]
    pub fn default_command(&self) -> &str {
        &self.default_command
    }

    /// Codec used for this module's frames.
    #[must_use]
    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }

    /// Controllers in resolution order.
    #[must_use]
    pub fn controllers(&self) -> &[ClassId] {
        &self.controllers
    }

    /// Method bound to a lifecycle event, if any.
    #[must_use]
    pub fn event_method(&self, event: ModuleEvent) -> Option<&str> {
        self.event_methods.get(&event).map(String::as_str)
    }

    /// All bound lifecycle hooks.
    #[must_use]
    pub const fn event_methods(&self) -> &BTreeMap<ModuleEvent, String> {
        &self.event_methods
    }

    pub(crate) fn set_path(&mut self, path: &str) {
        self.path = path.to_string();
    }

    /// Appends a controller unless it is already listed.
    pub(crate) fn push_controller(&mut self, controller: ClassId) {
        if !self.controllers.contains(&controller) {
            self.controllers.push(controller);
        }
    }

    /// Carries over the controllers and hooks bound to `previous`.
    ///
    /// Earlier controllers keep their resolution order ahead of any listed on
    /// `self`. Hooks set on `self` take precedence.
    pub(crate) fn keep_bindings_of(&mut self, previous: &Self) {
        let listed = std::mem::replace(&mut self.controllers, previous.controllers.clone());
        for controller in listed {
            self.push_controller(controller);
        }
        for (event, method) in &previous.event_methods {
            self.event_methods
                .entry(*event)
                .or_insert_with(|| method.clone());
        }
    }

    pub(crate) fn set_event_method(&mut self, event: ModuleEvent, method: &str) {
        self.event_methods.insert(event, method.to_string());
    }
}

/// One command within a controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteBinding {
    /// Handler target: a controller method, a handler class or an invocable.
    pub method: String,
    /// Command key.
    pub command: String,
}

/// One controller class attached to a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerBinding {
    /// Command namespace prefix.
    pub prefix: String,
    /// Path of the owning module.
    pub module: String,
    /// Controller class.
    pub class: ClassId,
    /// Routes in registration order.
    pub routes: Vec<RouteBinding>,
    /// Methods the controller class declares.
    pub methods: BTreeSet<String>,
}

impl ControllerBinding {
    pub(crate) fn new(module: &str, class: ClassId, prefix: &str) -> Self {
        let prefix = if prefix.is_empty() {
            class.short_name_without("Controller").to_string()
        } else {
            prefix.to_string()
        };
        Self {
            prefix,
            module: module.to_string(),
            class,
            routes: Vec::new(),
            methods: BTreeSet::new(),
        }
    }

    /// Returns the route answering `command`, either by its bare name or in
    /// the `prefix.command` namespaced form. An exact match is preferred.
    #[must_use]
    pub fn find_route(&self, command: &str) -> Option<&RouteBinding> {
        self.exact_route(command)
            .or_else(|| self.namespaced_route(command))
    }

    /// Returns the route whose command is exactly `command`.
    #[must_use]
    pub fn exact_route(&self, command: &str) -> Option<&RouteBinding> {
        self.routes.iter().find(|route| route.command == command)
    }

    /// Returns the route addressed as `prefix.command`.
    #[must_use]
    pub fn namespaced_route(&self, command: &str) -> Option<&RouteBinding> {
        let bare = command
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('.')?;
        self.exact_route(bare)
    }

    /// Returns `true` if the controller class declares `method`.
    #[must_use]
    pub fn has_method(&self, method: &str) -> bool {
        self.methods.contains(method)
    }

    /// Inserts or overwrites the route for `command`.
    ///
    /// An existing route keeps its position so resolution order does not
    /// shift when a command is re-bound.
    pub(crate) fn upsert_route(&mut self, method: &str, command: &str) -> bool {
        if let Some(route) = self.routes.iter_mut().find(|r| r.command == command) {
            route.method = method.to_string();
            return false;
        }
        self.routes.push(RouteBinding {
            method: method.to_string(),
            command: command.to_string(),
        });
        true
    }
}
