//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::service::Lifecycle;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Lifecycle manager owning the route table and open sessions.
    pub lifecycle: Arc<Lifecycle>,
    /// Runtime configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Bundles a lifecycle manager and configuration.
    #[must_use]
    pub fn new(lifecycle: Lifecycle, config: ServerConfig) -> Self {
        Self {
            lifecycle: Arc::new(lifecycle),
            config: Arc::new(config),
        }
    }
}
