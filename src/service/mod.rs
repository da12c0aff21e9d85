//! Service layer: handler resolution, frame dispatch and connection
//! lifecycle on top of the frozen [`crate::domain::RouteTable`].
//!
//! [`Lifecycle`] is the transport-facing entry point. It delegates frames to
//! the [`MessageDispatcher`], which resolves commands with the [`Resolver`]
//! and pulls handler instances from an [`InstanceContainer`].

pub mod container;
pub mod dispatcher;
pub mod lifecycle;
pub mod resolver;

pub use container::{
    CommandHandler, Controller, HandlerResult, HandshakeDecision, HandshakeRequest,
    InstanceContainer, InstanceRegistry, InvocableFn, ModuleHooks, invocable, report_format_error,
};
pub use dispatcher::{DispatchOutcome, MessageDispatcher};
pub use lifecycle::Lifecycle;
pub use resolver::{HandlerRef, Resolution, Resolver};
