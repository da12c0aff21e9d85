//! Route table snapshot returned by `GET /routes`.

use std::collections::BTreeMap;

use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{ControllerBinding, ModuleDescriptor, RegistrationStats, RouteTable};

/// Full dump of the registered routes.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoutesResponse {
    /// Modules in registration order.
    pub modules: Vec<ModuleDto>,
    /// Registration counters.
    pub stats: StatsDto,
}

/// One WebSocket module.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ModuleDto {
    /// Path the module serves (e.g. `"/chat"`).
    pub path: String,
    /// Display name.
    pub name: String,
    /// Module class.
    pub class: String,
    /// Codec name (`json`, `text`, `binary`).
    pub codec: String,
    /// Command used when a frame names none or an unknown one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_command: Option<String>,
    /// Lifecycle event to hook method.
    pub events: BTreeMap<String, String>,
    /// Controllers in resolution order.
    pub controllers: Vec<ControllerDto>,
}

/// One controller within a module.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ControllerDto {
    /// Controller class.
    pub class: String,
    /// Namespace prefix for `prefix.command` addressing.
    pub prefix: String,
    /// Routes in registration order.
    pub commands: Vec<CommandDto>,
}

/// One command route.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CommandDto {
    /// Command key.
    pub command: String,
    /// Handler target.
    pub target: String,
}

/// Registration counters.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct StatsDto {
    /// Modules bound.
    pub modules: u64,
    /// Controllers bound.
    pub controllers: u64,
    /// Commands bound.
    pub commands: u64,
    /// Lifecycle hooks bound.
    pub events: u64,
    /// Handler classes and invocables registered.
    pub handlers: u64,
}

impl From<RegistrationStats> for StatsDto {
    fn from(stats: RegistrationStats) -> Self {
        Self {
            modules: stats.modules,
            controllers: stats.controllers,
            commands: stats.commands,
            events: stats.events,
            handlers: stats.handlers,
        }
    }
}

impl From<&ControllerBinding> for ControllerDto {
    fn from(binding: &ControllerBinding) -> Self {
        Self {
            class: binding.class.to_string(),
            prefix: binding.prefix.clone(),
            commands: binding
                .routes
                .iter()
                .map(|route| CommandDto {
                    command: route.command.clone(),
                    target: route.method.clone(),
                })
                .collect(),
        }
    }
}

impl ModuleDto {
    fn from_descriptor(module: &ModuleDescriptor, table: &RouteTable) -> Self {
        Self {
            path: module.path().to_string(),
            name: module.name().to_string(),
            class: module.class().to_string(),
            codec: module.codec().name().to_string(),
            default_command: Some(module.default_command())
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            events: module
                .event_methods()
                .iter()
                .map(|(event, method)| (event.to_string(), method.clone()))
                .collect(),
            controllers: module
                .controllers()
                .iter()
                .filter_map(|class| table.get_controller(class))
                .map(ControllerDto::from)
                .collect(),
        }
    }
}

impl From<&RouteTable> for RoutesResponse {
    fn from(table: &RouteTable) -> Self {
        Self {
            modules: table
                .modules()
                .map(|module| ModuleDto::from_descriptor(module, table))
                .collect(),
            stats: table.stats().into(),
        }
    }
}
