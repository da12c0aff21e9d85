//! Length-prefixed binary codec.
//!
//! ```text
//! +----------------+-------------------+-------------+
//! | cmd_len (u16)  | command (utf-8)   | body bytes  |
//! | big-endian     | cmd_len bytes     | rest        |
//! +----------------+-------------------+-------------+
//! ```
//! A zero-length command selects the module's default command. An empty
//! remainder decodes as [`Body::Empty`].

use super::Codec;
use crate::domain::{Body, Envelope, Payload};
use crate::error::{DecodeError, EncodeError};

/// Size of the command length prefix.
const HEADER_LEN: usize = 2;

/// Codec for `[u16 len][command][body]` frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl Codec for BinaryCodec {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn decode(&self, payload: &Payload) -> Result<Envelope, DecodeError> {
        let bytes = payload.as_bytes();
        let (header, rest) = bytes.split_at_checked(HEADER_LEN).ok_or(DecodeError::Truncated {
            needed: HEADER_LEN,
            got: bytes.len(),
        })?;
        let cmd_len = match header {
            [hi, lo] => usize::from(u16::from_be_bytes([*hi, *lo])),
            _ => {
                return Err(DecodeError::Truncated {
                    needed: HEADER_LEN,
                    got: header.len(),
                });
            }
        };
        let (command, body) = rest.split_at_checked(cmd_len).ok_or(DecodeError::Truncated {
            needed: HEADER_LEN + cmd_len,
            got: bytes.len(),
        })?;
        let command = std::str::from_utf8(command).map_err(|_| DecodeError::InvalidUtf8)?;
        let body = if body.is_empty() {
            Body::Empty
        } else {
            Body::Binary(body.to_vec())
        };
        Ok(Envelope::new(command, body))
    }

    fn encode(&self, command: &str, body: &Body) -> Result<Payload, EncodeError> {
        let cmd_len =
            u16::try_from(command.len()).map_err(|_| EncodeError::CommandTooLong(command.len()))?;
        let body_bytes: Vec<u8> = match body {
            Body::Empty => Vec::new(),
            Body::Text(text) => text.as_bytes().to_vec(),
            Body::Json(value) => value.to_string().into_bytes(),
            Body::Binary(bytes) => bytes.clone(),
        };

        let mut out = Vec::with_capacity(HEADER_LEN + command.len() + body_bytes.len());
        out.extend_from_slice(&cmd_len.to_be_bytes());
        out.extend_from_slice(command.as_bytes());
        out.extend_from_slice(&body_bytes);
        Ok(Payload::Binary(out))
    }
}
