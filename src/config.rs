//! Server configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).
//!
//! | Variable               | Default        |
//! |------------------------|----------------|
//! | `LISTEN_ADDR`          | `0.0.0.0:3000` |
//! | `OUTBOUND_BUFFER`      | `256`          |
//! | `MAX_FRAME_BYTES`      | `1048576`      |
//! | `NOTIFY_FORMAT_ERRORS` | `true`         |
//! | `LOG_FORMAT`           | `text`         |

use std::net::SocketAddr;
use std::str::FromStr;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Top-level server configuration.
///
/// Loaded once at startup via [`ServerConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Capacity of each connection's outbound frame queue.
    pub outbound_buffer: usize,

    /// Largest inbound WebSocket message accepted, in bytes.
    pub max_frame_bytes: usize,

    /// Answer undecodable frames with an `error` message through the
    /// module's codec.
    pub notify_format_errors: bool,

    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            outbound_buffer: 256,
            max_frame_bytes: 1024 * 1024,
            notify_format_errors: true,
            log_format: LogFormat::Text,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let listen_addr = match std::env::var("LISTEN_ADDR") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid LISTEN_ADDR {raw:?}: {e}"))?,
            Err(_) => defaults.listen_addr,
        };

        Ok(Self {
            listen_addr,
            outbound_buffer: parse_env("OUTBOUND_BUFFER", defaults.outbound_buffer).max(1),
            max_frame_bytes: parse_env("MAX_FRAME_BYTES", defaults.max_frame_bytes),
            notify_format_errors: parse_env_bool(
                "NOTIFY_FORMAT_ERRORS",
                defaults.notify_format_errors,
            ),
            log_format: parse_env("LOG_FORMAT", defaults.log_format),
        })
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}
