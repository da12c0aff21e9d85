//! Domain layer: identifiers, registration records, frames and the route
//! table.
//!
//! Everything here is plain data. The route table is built once at startup
//! and read concurrently afterwards; the frame types are what codecs,
//! handlers and the transport exchange.

pub mod class_id;
pub mod connection_id;
pub mod descriptor;
pub mod frame;
pub mod route_table;

pub use class_id::ClassId;
pub use connection_id::ConnectionId;
pub use descriptor::{ControllerBinding, ModuleDescriptor, ModuleEvent, RouteBinding};
pub use frame::{Body, Envelope, OutboundFrame, Payload};
pub use route_table::{RegistrationStats, RouteTable};
