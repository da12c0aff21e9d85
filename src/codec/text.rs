//! Raw text codec.
//!
//! The whole frame is the body and the command is always empty, so every
//! frame is routed to the module's default command. Useful for plain chat
//! style endpoints where clients just send strings.

use super::Codec;
use crate::domain::{Body, Envelope, Payload};
use crate::error::{DecodeError, EncodeError};

/// Codec that treats each frame as a command-less text body.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl Codec for TextCodec {
    fn name(&self) -> &'static str {
        "text"
    }

    fn decode(&self, payload: &Payload) -> Result<Envelope, DecodeError> {
        let text = match payload {
            Payload::Text(text) => text.clone(),
            Payload::Binary(bytes) => {
                String::from_utf8(bytes.clone()).map_err(|_| DecodeError::InvalidUtf8)?
            }
        };
        Ok(Envelope::new(String::new(), Body::Text(text)))
    }

    fn encode(&self, _command: &str, body: &Body) -> Result<Payload, EncodeError> {
        match body {
            Body::Empty => Ok(Payload::Text(String::new())),
            Body::Text(text) => Ok(Payload::Text(text.clone())),
            Body::Json(value) => Ok(Payload::Text(value.to_string())),
            Body::Binary(_) => Err(EncodeError::Unsupported(
                "binary body in text codec".to_string(),
            )),
        }
    }
}
