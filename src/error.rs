//! Error types for registration, decoding, resolution and connection
//! lifecycle.
//!
//! Each concern has its own enum so callers can tell fatal startup errors
//! ([`RegistrationError`]) from per-frame errors that are reported as a
//! [`crate::service::DispatchOutcome`] and never close the connection.
//!
//! # Error Code Ranges
//!
//! | Range     | Category      | Fatal?                        |
//! |-----------|---------------|-------------------------------|
//! | 1000–1999 | Registration  | yes, at startup               |
//! | 2000–2999 | Codec         | no, per frame                 |
//! | 3000–3999 | Resolution    | no, per frame                 |
//! | 4000–4999 | Lifecycle     | closes the offending socket   |
//! | 5000–5999 | Container     | no, reported as handler error |

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::{ClassId, ConnectionId};
use crate::ws::context::ConnectionState;

/// WebSocket close code sent when a connection is torn down after a
/// lifecycle violation (RFC 6455 "internal error").
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Structured JSON error response body.
///
/// Used for rejected handshakes:
/// ```json
/// {
///   "error": {
///     "code": 404,
///     "message": "no websocket module is bound to /nope",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Errors raised while building the route table.
///
/// Any of these means the table is inconsistent; the server must not start
/// accepting connections.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    /// The path is already owned by a module of another class.
    #[error("path {path} is already bound to {existing}, cannot bind {requested}")]
    DuplicatePath {
        /// Conflicting path.
        path: String,
        /// Class that owns the path.
        existing: ClassId,
        /// Class that tried to bind it.
        requested: ClassId,
    },

    /// A controller or event referenced a module that was never bound.
    #[error("unknown module: {0}")]
    UnknownModule(String),

    /// A command referenced a controller that was never bound.
    #[error("unknown controller: {0}")]
    UnknownController(ClassId),

    /// A controller was bound to a second module.
    #[error("controller {controller} already belongs to module {bound_to}, cannot bind to {requested}")]
    ControllerConflict {
        /// Controller class.
        controller: ClassId,
        /// Path of the module that owns it.
        bound_to: String,
        /// Path of the module that tried to claim it.
        requested: String,
    },

    /// Lifecycle event name is not one of handshake, open, close, message.
    #[error("unknown lifecycle event: {0}")]
    UnknownEvent(String),
}

impl RegistrationError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::DuplicatePath { .. } => 1001,
            Self::UnknownModule(_) => 1002,
            Self::UnknownController(_) => 1003,
            Self::ControllerConflict { .. } => 1004,
            Self::UnknownEvent(_) => 1005,
        }
    }
}

/// A codec could not turn a payload into an envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Payload is not valid for the codec's syntax.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The command field is present but not a string.
    #[error("command must be a string")]
    InvalidCommand,

    /// Binary payload is shorter than its own header claims.
    #[error("frame truncated: need {needed} bytes, got {got}")]
    Truncated {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        got: usize,
    },

    /// Text was expected but the bytes are not UTF-8.
    #[error("payload is not valid utf-8")]
    InvalidUtf8,
}

impl DecodeError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Malformed(_) => 2001,
            Self::InvalidCommand => 2002,
            Self::Truncated { .. } => 2003,
            Self::InvalidUtf8 => 2004,
        }
    }
}

/// A codec could not turn a reply into a payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// Body cannot be represented by this codec.
    #[error("body cannot be encoded: {0}")]
    Unsupported(String),

    /// Command does not fit the codec's header.
    #[error("command too long: {0} bytes")]
    CommandTooLong(usize),
}

/// No handler could be resolved for a command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    /// Neither the command nor the module's default command is routed.
    #[error("command {command:?} is not registered")]
    CommandNotFound {
        /// Command as requested by the peer.
        command: String,
    },

    /// The route exists but its target is not a method, handler class or
    /// invocable.
    #[error("invalid handler {target:?} for command {command:?}")]
    InvalidHandler {
        /// Command that matched.
        command: String,
        /// Route target that could not be resolved.
        target: String,
    },
}

impl ResolutionError {
    /// Returns the failing command name.
    #[must_use]
    pub fn command(&self) -> &str {
        match self {
            Self::CommandNotFound { command } | Self::InvalidHandler { command, .. } => command,
        }
    }

    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::CommandNotFound { .. } => 3001,
            Self::InvalidHandler { .. } => 3002,
        }
    }
}

/// The transport drove a connection through an invalid lifecycle step.
///
/// These indicate a bug in the caller. They are logged at `error` and the
/// offending connection is closed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// A frame arrived for a connection that was never opened.
    #[error("connection {0} is not bound to any module")]
    NoModuleBound(ConnectionId),

    /// A frame or event arrived after the connection closed.
    #[error("connection {0} is closed")]
    ConnectionClosed(ConnectionId),

    /// The event is not valid in the connection's current state.
    #[error("connection {connection}: cannot {event} while {state}")]
    InvalidTransition {
        /// Connection identifier.
        connection: ConnectionId,
        /// Event that was attempted.
        event: &'static str,
        /// State the connection was in.
        state: ConnectionState,
    },
}

impl LifecycleError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::NoModuleBound(_) => 4001,
            Self::ConnectionClosed(_) => 4002,
            Self::InvalidTransition { .. } => 4003,
        }
    }
}

/// The instance container could not supply an instance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContainerError {
    /// No factory is registered for the class.
    #[error("no instance registered for class {0}")]
    UnknownClass(ClassId),

    /// The factory failed.
    #[error("failed to construct {class}: {reason}")]
    Construction {
        /// Class being constructed.
        class: ClassId,
        /// Factory error message.
        reason: String,
    },
}

impl ContainerError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::UnknownClass(_) => 5001,
            Self::Construction { .. } => 5002,
        }
    }
}

/// A handler could not queue a frame for its peer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// Replies through the codec need a module binding.
    #[error("connection {0} is not bound to a module")]
    NotBound(ConnectionId),

    /// The bound codec refused the reply.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The writer side of the connection is gone.
    #[error("connection {0} outbound queue is closed")]
    Closed(ConnectionId),
}

/// A refused WebSocket handshake, rendered as a plain HTTP response.
#[derive(Debug)]
pub struct HandshakeRejection {
    /// HTTP status returned to the client.
    pub status: StatusCode,
    /// Extra headers set by the handshake hook.
    pub headers: HeaderMap,
    /// Human-readable reason.
    pub message: String,
}

impl HandshakeRejection {
    /// Creates a rejection with no extra headers.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            message: message.into(),
        }
    }
}

impl IntoResponse for HandshakeRejection {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: u32::from(self.status.as_u16()),
                message: self.message,
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().extend(self.headers);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_error_exposes_command() {
        let err = ResolutionError::InvalidHandler {
            command: "ping".to_string(),
            target: "doPing".to_string(),
        };
        assert_eq!(err.command(), "ping");
        assert_eq!(err.error_code(), 3002);
    }

    #[test]
    fn registration_codes_are_in_range() {
        let err = RegistrationError::UnknownModule("/x".to_string());
        assert!((1000..2000).contains(&err.error_code()));
    }

    #[test]
    fn duplicate_path_message_names_both_classes() {
        let err = RegistrationError::DuplicatePath {
            path: "/chat".to_string(),
            existing: ClassId::new("A"),
            requested: ClassId::new("B"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/chat"));
        assert!(msg.contains('A'));
        assert!(msg.contains('B'));
    }

    #[test]
    fn rejection_uses_status_and_headers() {
        let mut rejection = HandshakeRejection::new(StatusCode::FORBIDDEN, "go away");
        rejection
            .headers
            .insert("x-reason", axum::http::HeaderValue::from_static("test"));
        let response = rejection.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers().get("x-reason").map(|v| v.as_bytes()),
            Some(&b"test"[..])
        );
    }
}
