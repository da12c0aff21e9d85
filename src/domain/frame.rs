//! Frame and envelope types shared by codecs, handlers and the transport.
//!
//! Inbound frames arrive as a [`Payload`], are decoded by a module's codec
//! into an [`Envelope`], and handlers reply by queueing [`OutboundFrame`]s on
//! their connection.

use serde::Serialize;

/// Raw payload of one WebSocket data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

impl Payload {
    /// Returns the payload as bytes regardless of frame kind.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    /// Returns the payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns `true` if the payload carries no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decoded message body handed to a handler.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Body {
    /// No body was present.
    Empty,
    /// Plain text body.
    Text(String),
    /// Structured JSON body.
    Json(serde_json::Value),
    /// Opaque binary body.
    Binary(Vec<u8>),
}

impl Body {
    /// Returns the body as text when it is textual (or a JSON string).
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Json(serde_json::Value::String(text)) => Some(text),
            _ => None,
        }
    }

    /// Returns the JSON value when the body is structured.
    #[must_use]
    pub const fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Converts the body into a JSON value. Binary bodies become an array of
    /// byte values.
    #[must_use]
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Self::Empty => serde_json::Value::Null,
            Self::Text(text) => serde_json::Value::String(text),
            Self::Json(value) => value,
            Self::Binary(bytes) => serde_json::Value::from(bytes),
        }
    }
}

/// The logical `(command, body)` pair produced by a codec.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Command name. Empty when the frame carried none.
    pub command: String,
    /// Decoded body.
    pub body: Body,
}

impl Envelope {
    /// Creates an envelope.
    #[must_use]
    pub fn new(command: impl Into<String>, body: Body) -> Self {
        Self {
            command: command.into(),
            body,
        }
    }
}

/// Frame queued by the server for delivery to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// Close frame; the writer stops after sending it.
    Close {
        /// WebSocket close code (RFC 6455 section 7.4).
        code: u16,
        /// Human-readable reason.
        reason: String,
    },
}

impl From<Payload> for OutboundFrame {
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::Text(text) => Self::Text(text),
            Payload::Binary(bytes) => Self::Binary(bytes),
        }
    }
}
