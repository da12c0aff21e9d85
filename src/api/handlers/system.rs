//! System endpoints: health check and route table dump.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::dto::RoutesResponse;
use crate::app_state::AppState;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub(crate) struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
    connections: usize,
}

/// `GET /health`: service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, current timestamp and the number of open WebSocket connections.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let connections = state.lifecycle.sessions().len().await;
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            connections,
        }),
    )
}

/// `GET /routes`: registered modules, controllers and commands.
#[utoipa::path(
    get,
    path = "/routes",
    tag = "System",
    summary = "List routes",
    description = "Returns every WebSocket module with its lifecycle hooks, controllers and command routes, plus the registration counters.",
    responses(
        (status = 200, description = "Route table snapshot", body = RoutesResponse),
    )
)]
pub async fn routes_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = RoutesResponse::from(state.lifecycle.table().as_ref());
    (StatusCode::OK, Json(snapshot))
}

/// System routes mounted at the root level.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/routes", get(routes_handler))
}
