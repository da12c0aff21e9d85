//! WebSocket layer: upgrade handling, per-connection context, read/write
//! loop and the registry of open sessions.
//!
//! Every path not claimed by the diagnostics API is a candidate WebSocket
//! endpoint; the module bound at that path in the route table serves it.

pub mod connection;
pub mod context;
pub mod handler;
pub mod sessions;

pub use context::{ConnectionContext, ConnectionState};
pub use sessions::SessionRegistry;
