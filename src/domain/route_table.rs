//! Write-once, read-many registry of modules, controllers and commands.
//!
//! [`RouteTable`] is filled by the registration pass through `&mut self`
//! methods, then moved into an `Arc` and shared by the resolver, dispatcher
//! and lifecycle. After that point nothing can mutate it, so concurrent reads
//! need no locking.
//!
//! Registration order matters: a module must be bound before any controller
//! references it, and a controller before any of its commands. Within a
//! module, controllers and their routes are kept in insertion order because
//! resolution takes the first match.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::Serialize;

use super::ClassId;
use super::descriptor::{ControllerBinding, ModuleDescriptor, ModuleEvent, RouteBinding};
use crate::error::RegistrationError;
use crate::service::container::InvocableFn;

/// Counters of successful registration writes, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationStats {
    /// `bind_module` calls.
    pub modules: u64,
    /// `bind_controller` calls.
    pub controllers: u64,
    /// `bind_command` and `bind_target` calls.
    pub commands: u64,
    /// `bind_event` calls.
    pub events: u64,
    /// `bind_handler_class` and `bind_invocable` calls.
    pub handlers: u64,
}

/// Process-wide routing table.
#[derive(Default)]
pub struct RouteTable {
    modules: HashMap<String, ModuleDescriptor>,
    module_order: Vec<String>,
    controllers: HashMap<ClassId, ControllerBinding>,
    handler_classes: BTreeSet<ClassId>,
    invocables: HashMap<String, InvocableFn>,
    stats: RegistrationStats,
}

impl RouteTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `descriptor` as the module serving `path`.
    ///
    /// Binding a path again with the same class replaces the descriptor but
    /// keeps the controllers and event hooks already attached to the path.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::DuplicatePath`] if `path` is already
    /// bound to a module of a different class.
    pub fn bind_module(
        &mut self,
        path: &str,
        mut descriptor: ModuleDescriptor,
    ) -> Result<(), RegistrationError> {
        let path = normalize_path(path);
        if let Some(existing) = self.modules.get(&path) {
            if existing.class() != descriptor.class() {
                return Err(RegistrationError::DuplicatePath {
                    path,
                    existing: existing.class().clone(),
                    requested: descriptor.class().clone(),
                });
            }
            descriptor.keep_bindings_of(existing);
        }

        descriptor.set_path(&path);
        tracing::debug!(%path, class = %descriptor.class(), "module bound");
        if self.modules.insert(path.clone(), descriptor).is_none() {
            self.module_order.push(path);
        }
        self.stats.modules = self.stats.modules.saturating_add(1);
        Ok(())
    }

    /// Attaches `controller` to the module at `module_path`.
    ///
    /// An empty `prefix` derives one from the class name
    /// (`app::ChatController` becomes `Chat`). Binding the same controller to
    /// the same module again only updates a non-empty prefix.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::UnknownModule`] if no module is bound at
    /// `module_path`, or [`RegistrationError::ControllerConflict`] if the
    /// controller already belongs to another module.
    pub fn bind_controller(
        &mut self,
        module_path: &str,
        controller: impl Into<ClassId>,
        prefix: &str,
    ) -> Result<(), RegistrationError> {
        let path = normalize_path(module_path);
        let controller = controller.into();
        let Some(module) = self.modules.get_mut(&path) else {
            return Err(RegistrationError::UnknownModule(path));
        };

        match self.controllers.get_mut(&controller) {
            Some(binding) if binding.module != path => {
                return Err(RegistrationError::ControllerConflict {
                    controller,
                    bound_to: binding.module.clone(),
                    requested: path,
                });
            }
            Some(binding) => {
                if !prefix.is_empty() {
                    binding.prefix = prefix.to_string();
                }
            }
            None => {
                let binding = ControllerBinding::new(&path, controller.clone(), prefix);
                self.controllers.insert(controller.clone(), binding);
            }
        }

        tracing::debug!(module = %path, %controller, "controller bound");
        module.push_controller(controller);
        self.stats.controllers = self.stats.controllers.saturating_add(1);
        Ok(())
    }

    /// Routes `command` to the controller method `method`, declaring the
    /// method on the controller. An empty `command` defaults to `method`.
    ///
    /// Re-binding a command the controller already routes overwrites the
    /// earlier target (last write wins) and keeps the route's position.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::UnknownController`] if the controller was
    /// never bound.
    pub fn bind_command(
        &mut self,
        controller: impl Into<ClassId>,
        method: &str,
        command: &str,
    ) -> Result<(), RegistrationError> {
        let controller = controller.into();
        let binding = self
            .controllers
            .get_mut(&controller)
            .ok_or_else(|| RegistrationError::UnknownController(controller.clone()))?;
        binding.methods.insert(method.to_string());
        self.upsert(controller, method, command)
    }

    /// Routes `command` to `target` without declaring it as a controller
    /// method. `target` is expected to name a handler class or invocable
    /// registered with [`Self::bind_handler_class`] or
    /// [`Self::bind_invocable`], or a method declared elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::UnknownController`] if the controller was
    /// never bound.
    pub fn bind_target(
        &mut self,
        controller: impl Into<ClassId>,
        target: &str,
        command: &str,
    ) -> Result<(), RegistrationError> {
        self.upsert(controller.into(), target, command)
    }

    /// Declares methods that exist on a controller class.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::UnknownController`] if the controller was
    /// never bound.
    pub fn declare_methods<I, S>(
        &mut self,
        controller: impl Into<ClassId>,
        methods: I,
    ) -> Result<(), RegistrationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let controller = controller.into();
        let binding = self
            .controllers
            .get_mut(&controller)
            .ok_or(RegistrationError::UnknownController(controller))?;
        binding.methods.extend(methods.into_iter().map(Into::into));
        Ok(())
    }

    /// Binds `method` as the hook for `event` on every module of class
    /// `module_class`. `event` is one of `handshake`, `open`, `close`,
    /// `message` (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::UnknownEvent`] for any other event name
    /// and [`RegistrationError::UnknownModule`] if no module of that class is
    /// bound.
    pub fn bind_event(
        &mut self,
        module_class: impl Into<ClassId>,
        method: &str,
        event: &str,
    ) -> Result<(), RegistrationError> {
        let module_class = module_class.into();
        let event: ModuleEvent = event.parse()?;

        let mut bound = false;
        for module in self
            .modules
            .values_mut()
            .filter(|m| *m.class() == module_class)
        {
            module.set_event_method(event, method);
            bound = true;
        }
        if !bound {
            return Err(RegistrationError::UnknownModule(module_class.to_string()));
        }

        tracing::debug!(module = %module_class, %event, method, "event hook bound");
        self.stats.events = self.stats.events.saturating_add(1);
        Ok(())
    }

    /// Registers a class whose instances expose a single `execute` entry
    /// point.
    pub fn bind_handler_class(&mut self, class: impl Into<ClassId>) {
        self.handler_classes.insert(class.into());
        self.stats.handlers = self.stats.handlers.saturating_add(1);
    }

    /// Registers a named invocable route target. Re-registering a name
    /// replaces the earlier function.
    pub fn bind_invocable(&mut self, name: &str, handler: InvocableFn) {
        self.invocables.insert(name.to_string(), handler);
        self.stats.handlers = self.stats.handlers.saturating_add(1);
    }

    /// Returns the module bound at `path`.
    #[must_use]
    pub fn get_module(&self, path: &str) -> Option<&ModuleDescriptor> {
        self.modules.get(&normalize_path(path))
    }

    /// Returns every module registered for `class`, in registration order.
    #[must_use]
    pub fn get_modules_by_class(&self, class: &ClassId) -> Vec<&ModuleDescriptor> {
        self.modules().filter(|m| m.class() == class).collect()
    }

    /// Returns the routes of `controller` in registration order.
    #[must_use]
    pub fn get_commands_for_controller(&self, controller: &ClassId) -> Option<&[RouteBinding]> {
        self.controllers
            .get(controller)
            .map(|binding| binding.routes.as_slice())
    }

    /// Returns the binding for `controller`.
    #[must_use]
    pub fn get_controller(&self, controller: &ClassId) -> Option<&ControllerBinding> {
        self.controllers.get(controller)
    }

    /// Returns `true` if `class` was registered as an execute-capable handler.
    #[must_use]
    pub fn is_handler_class(&self, class: &str) -> bool {
        self.handler_classes.contains(&ClassId::new(class))
    }

    /// Returns the invocable registered under `name`.
    #[must_use]
    pub fn get_invocable(&self, name: &str) -> Option<&InvocableFn> {
        self.invocables.get(name)
    }

    /// Iterates modules in registration order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.module_order
            .iter()
            .filter_map(|path| self.modules.get(path))
    }

    /// Returns the registration counters.
    #[must_use]
    pub const fn stats(&self) -> RegistrationStats {
        self.stats
    }

    fn upsert(
        &mut self,
        controller: ClassId,
        target: &str,
        command: &str,
    ) -> Result<(), RegistrationError> {
        let binding = self
            .controllers
            .get_mut(&controller)
            .ok_or_else(|| RegistrationError::UnknownController(controller.clone()))?;
        let command = if command.is_empty() { target } else { command };
        if !binding.upsert_route(target, command) {
            tracing::warn!(
                %controller,
                command,
                target,
                "command re-bound, previous target replaced"
            );
        }
        self.stats.commands = self.stats.commands.saturating_add(1);
        Ok(())
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("modules", &self.module_order)
            .field("controllers", &self.controllers.len())
            .field("handler_classes", &self.handler_classes)
            .field("invocables", &self.invocables.keys().collect::<Vec<_>>())
            .field("stats", &self.stats)
            .finish()
    }
}

/// Normalizes a module path to a leading slash and no trailing slash.
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
