//! JSON envelope codec.
//!
//! Wire format:
//! ```json
//! { "cmd": "chat.send", "data": { "text": "hello" } }
//! ```
//! `command` and `body` are accepted as aliases. A missing command decodes
//! as the empty command so the module's default command applies.

use serde::{Deserialize, Serialize};

use super::Codec;
use crate::domain::{Body, Envelope, Payload};
use crate::error::{DecodeError, EncodeError};

#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    #[serde(default, alias = "command")]
    cmd: Option<serde_json::Value>,
    #[serde(default, alias = "body")]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct OutboundEnvelope<'a> {
    cmd: &'a str,
    data: &'a Body,
}

/// Codec for `{"cmd": ..., "data": ...}` JSON objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn decode(&self, payload: &Payload) -> Result<Envelope, DecodeError> {
        let text = match payload {
            Payload::Text(text) => text.as_str(),
            Payload::Binary(bytes) => {
                std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?
            }
        };

        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        if !value.is_object() {
            return Err(DecodeError::Malformed(
                "expected a JSON object envelope".to_string(),
            ));
        }
        let inbound: InboundEnvelope =
            serde_json::from_value(value).map_err(|e| DecodeError::Malformed(e.to_string()))?;

        let command = match inbound.cmd {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(cmd)) => cmd,
            Some(_) => return Err(DecodeError::InvalidCommand),
        };
        let body = match inbound.data {
            None | Some(serde_json::Value::Null) => Body::Empty,
            Some(value) => Body::Json(value),
        };

        Ok(Envelope::new(command, body))
    }

    fn encode(&self, command: &str, body: &Body) -> Result<Payload, EncodeError> {
        let json = serde_json::to_string(&OutboundEnvelope { cmd: command, data: body })
            .map_err(|e| EncodeError::Unsupported(e.to_string()))?;
        Ok(Payload::Text(json))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn decode(text: &str) -> Result<Envelope, DecodeError> {
        JsonCodec.decode(&Payload::Text(text.to_string()))
    }

    #[test]
    fn decodes_command_and_data() {
        let Ok(env) = decode(r#"{"cmd":"ping","data":{"n":1}}"#) else {
            panic!("decode failed");
        };
        assert_eq!(env.command, "ping");
        assert_eq!(env.body, Body::Json(serde_json::json!({"n": 1})));
    }

    #[test]
    fn accepts_command_and_body_aliases() {
        let Ok(env) = decode(r#"{"command":"ping","body":"x"}"#) else {
            panic!("decode failed");
        };
        assert_eq!(env.command, "ping");
        assert_eq!(env.body.as_text(), Some("x"));
    }

    #[test]
    fn missing_command_is_empty() {
        let Ok(env) = decode(r#"{"data":"hello"}"#) else {
            panic!("decode failed");
        };
        assert!(env.command.is_empty());
    }

    #[test]
    fn missing_data_is_empty_body() {
        let Ok(env) = decode(r#"{"cmd":"ping"}"#) else {
            panic!("decode failed");
        };
        assert_eq!(env.body, Body::Empty);
    }

    #[test]
    fn invalid_json_is_malformed() {
        assert!(matches!(decode("{not json"), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn non_object_is_malformed() {
        assert!(matches!(decode("[1,2]"), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn numeric_command_is_rejected() {
        assert_eq!(decode(r#"{"cmd":5}"#), Err(DecodeError::InvalidCommand));
    }

    #[test]
    fn binary_frame_must_be_utf8() {
        let result = JsonCodec.decode(&Payload::Binary(vec![0xff, 0xfe]));
        assert_eq!(result, Err(DecodeError::InvalidUtf8));
    }

    #[test]
    fn encode_writes_cmd_and_data() {
        let Ok(Payload::Text(text)) = JsonCodec.encode("pong", &Body::Text("ok".to_string()))
        else {
            panic!("encode failed");
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
            panic!("encoded output is not json");
        };
        assert_eq!(value, serde_json::json!({"cmd": "pong", "data": "ok"}));
    }
}
