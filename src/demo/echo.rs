//! `/echo` and `/raw`: minimal modules.
//!
//! `/echo` uses the text codec, so every frame lands on the default `echo`
//! command. `/raw` binds a `message` hook and bounces each frame back
//! untouched, bypassing decoding and routing.

use async_trait::async_trait;

use crate::domain::{Body, Payload};
use crate::service::{Controller, HandlerResult, ModuleHooks};
use crate::ws::ConnectionContext;

/// Text echo module class.
pub const ECHO_MODULE: &str = "demo::EchoModule";
/// Text echo controller class.
pub const ECHO_CONTROLLER: &str = "demo::EchoController";
/// Raw bounce module class.
pub const RAW_MODULE: &str = "demo::RawModule";

/// Replies to text frames with the same text.
#[derive(Debug, Default)]
pub struct EchoController;

#[async_trait]
impl Controller for EchoController {
    async fn invoke(&self, method: &str, body: Body, conn: ConnectionContext) -> HandlerResult {
        anyhow::ensure!(method == "echo", "EchoController has no method {method}");
        conn.reply("echo", &body).await?;
        Ok(())
    }
}

/// Sends every inbound frame straight back.
#[derive(Debug, Default)]
pub struct RawModule;

#[async_trait]
impl ModuleHooks for RawModule {
    async fn on_message(
        &self,
        _method: &str,
        payload: Payload,
        conn: ConnectionContext,
    ) -> HandlerResult {
        conn.send(payload.into()).await?;
        Ok(())
    }
}
