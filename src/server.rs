//! HTTP router composition.

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// Builds the full application router: diagnostics endpoints plus a
/// WebSocket upgrade on every other path.
///
/// Static API routes take precedence over the catch-all, so a module cannot
/// be bound at `/health` or `/routes`.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(api::build_router())
        .route("/", get(ws_handler))
        .route("/{*path}", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
