//! switchyard server entry point.
//!
//! Registers the demo modules and serves them over WebSocket alongside the
//! diagnostics endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use switchyard::app_state::AppState;
use switchyard::config::{LogFormat, ServerConfig};
use switchyard::demo;
use switchyard::server::build_app;
use switchyard::service::Lifecycle;
use switchyard::ws::SessionRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting switchyard");

    // Registration pass; an inconsistent table must never serve traffic
    let sessions = Arc::new(SessionRegistry::new());
    let (table, container) = match demo::register(&sessions) {
        Ok(built) => built,
        Err(e) => {
            tracing::error!(code = e.error_code(), error = %e, "route registration failed");
            return Err(e.into());
        }
    };

    // Build application state
    let lifecycle = Lifecycle::with_sessions(Arc::new(table), Arc::new(container), sessions);
    let listen_addr = config.listen_addr;
    let app = build_app(AppState::new(lifecycle, config));

    // Start server
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(addr = %listen_addr, "server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
