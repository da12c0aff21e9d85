//! Pluggable codecs for the `(command, body)` envelope.
//!
//! A module picks one codec at registration time; the dispatcher uses it to
//! decode every inbound frame for that module, and handlers may use it to
//! format replies. Codecs are stateless and shared behind an `Arc`.

pub mod binary;
pub mod json;
pub mod text;

use std::fmt;

pub use binary::BinaryCodec;
pub use json::JsonCodec;
pub use text::TextCodec;

use crate::domain::{Body, Envelope, Payload};
use crate::error::{DecodeError, EncodeError};

/// Decodes inbound payloads into envelopes and encodes replies.
pub trait Codec: Send + Sync + fmt::Debug {
    /// Short codec name used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Splits a raw payload into its command and body.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] when the payload does not follow the codec's
    /// format. The frame is then reported as a format error.
    fn decode(&self, payload: &Payload) -> Result<Envelope, DecodeError>;

    /// Builds a payload carrying `command` and `body`.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] when the body or command cannot be
    /// represented by the codec.
    fn encode(&self, command: &str, body: &Body) -> Result<Payload, EncodeError>;
}
