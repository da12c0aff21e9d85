//! Command resolution: from `(module, command)` to a handler reference.
//!
//! Resolution walks the module's controllers in registration order and takes
//! the first route answering the command. The route's target is then looked
//! up in strict precedence:
//!
//! 1. a method declared on that controller ([`HandlerRef::BoundMethod`]),
//! 2. a registered execute-capable handler class ([`HandlerRef::ExecuteObject`]),
//! 3. a registered invocable ([`HandlerRef::Invocable`]).
//!
//! Anything else is an invalid handler. A missing or unrouted command falls
//! back to the module's default command.

use std::fmt;
use std::sync::Arc;

use crate::domain::{ClassId, ControllerBinding, ModuleDescriptor, RouteBinding, RouteTable};
use crate::error::ResolutionError;
use crate::service::container::InvocableFn;

/// A resolved handler target.
#[derive(Clone)]
pub enum HandlerRef {
    /// A method on a controller instance supplied by the container.
    BoundMethod {
        /// Controller class.
        controller: ClassId,
        /// Method name.
        method: String,
    },
    /// A handler object whose `execute` entry point handles the command.
    ExecuteObject {
        /// Handler class.
        class: ClassId,
    },
    /// A free-standing function.
    Invocable {
        /// Registered name.
        name: String,
        /// The function itself.
        handler: InvocableFn,
    },
}

impl HandlerRef {
    /// Short tag for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BoundMethod { .. } => "bound_method",
            Self::ExecuteObject { .. } => "execute_object",
            Self::Invocable { .. } => "invocable",
        }
    }
}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BoundMethod { controller, method } => f
                .debug_struct("BoundMethod")
                .field("controller", controller)
                .field("method", method)
                .finish(),
            Self::ExecuteObject { class } => {
                f.debug_struct("ExecuteObject").field("class", class).finish()
            }
            Self::Invocable { name, .. } => {
                f.debug_struct("Invocable").field("name", name).finish()
            }
        }
    }
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Command that was actually routed; the default command when the
    /// requested one was empty or unknown.
    pub command: String,
    /// Handler to invoke.
    pub handler: HandlerRef,
}

/// Resolves commands against a frozen [`RouteTable`].
#[derive(Debug, Clone)]
pub struct Resolver {
    table: Arc<RouteTable>,
}

impl Resolver {
    /// Creates a resolver over `table`.
    #[must_use]
    pub const fn new(table: Arc<RouteTable>) -> Self {
        Self { table }
    }

    /// Resolves `command` within `module`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::CommandNotFound`] when neither `command`
    /// nor the module's default command is routed, and
    /// [`ResolutionError::InvalidHandler`] when the matching route's target is
    /// not a declared method, handler class or invocable.
    pub fn resolve(
        &self,
        module: &ModuleDescriptor,
        command: &str,
    ) -> Result<Resolution, ResolutionError> {
        let routed = if command.is_empty() {
            None
        } else {
            self.find_route(module, command)
                .map(|found| (command, found))
        };

        let (command, (controller, route)) = match routed {
            Some(found) => found,
            None => {
                let fallback = module.default_command();
                let found = (!fallback.is_empty())
                    .then(|| self.find_route(module, fallback))
                    .flatten()
                    .ok_or_else(|| ResolutionError::CommandNotFound {
                        command: command.to_string(),
                    })?;
                tracing::trace!(requested = command, fallback, "using default command");
                (fallback, found)
            }
        };

        let handler = self.handler_for(controller, &route.method).ok_or_else(|| {
            ResolutionError::InvalidHandler {
                command: command.to_string(),
                target: route.method.clone(),
            }
        })?;

        Ok(Resolution {
            command: command.to_string(),
            handler,
        })
    }

    /// Exact matches across every controller win over the namespaced form.
    fn find_route<'a>(
        &'a self,
        module: &ModuleDescriptor,
        command: &str,
    ) -> Option<(&'a ControllerBinding, &'a RouteBinding)> {
        let bindings = || {
            module
                .controllers()
                .iter()
                .filter_map(|class| self.table.get_controller(class))
        };
        bindings()
            .find_map(|binding| binding.exact_route(command).map(|route| (binding, route)))
            .or_else(|| {
                bindings().find_map(|binding| {
                    binding
                        .namespaced_route(command)
                        .map(|route| (binding, route))
                })
            })
    }

    fn handler_for(&self, controller: &ControllerBinding, target: &str) -> Option<HandlerRef> {
        if controller.has_method(target) {
            return Some(HandlerRef::BoundMethod {
                controller: controller.class.clone(),
                method: target.to_string(),
            });
        }
        if self.table.is_handler_class(target) {
            return Some(HandlerRef::ExecuteObject {
                class: ClassId::new(target),
            });
        }
        self.table
            .get_invocable(target)
            .map(|handler| HandlerRef::Invocable {
                name: target.to_string(),
                handler: Arc::clone(handler),
            })
    }
}
