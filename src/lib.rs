//! # switchyard
//!
//! Module and command routing core for WebSocket application servers.
//!
//! Applications register WebSocket *modules* bound to URL paths, attach
//! *controllers* to them and map *commands* to handler targets. At runtime
//! each inbound frame is decoded by the module's codec into a
//! `(command, body)` envelope, the command is resolved to a handler (a
//! controller method, an execute-capable handler object or a plain
//! function) and the handler is invoked with the body and the connection.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket, HTTP diagnostics)
//!     │
//!     ├── WS upgrade + read/write loop (ws/)
//!     ├── /health, /routes (api/)
//!     │
//!     ├── Lifecycle (service/)
//!     │     └── MessageDispatcher ── Resolver
//!     │
//!     ├── RouteTable (domain/), frozen behind Arc
//!     ├── Codecs (codec/)
//!     │
//!     └── InstanceContainer (controllers, handlers, module hooks)
//! ```
//!
//! ## Startup
//!
//! Registration is an explicit pass over a `&mut RouteTable`: modules
//! first, then controllers, then commands and lifecycle hooks. Any
//! [`error::RegistrationError`] is fatal. The table is then moved into an
//! `Arc` and never mutated again.

pub mod api;
pub mod app_state;
pub mod codec;
pub mod config;
pub mod demo;
pub mod domain;
pub mod error;
pub mod server;
pub mod service;
pub mod ws;
