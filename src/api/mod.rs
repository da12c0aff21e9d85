//! REST API layer: diagnostics handlers, DTOs, OpenAPI description and
//! router composition.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI description of the diagnostics endpoints.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "switchyard", description = "WebSocket module router diagnostics"),
    paths(handlers::system::health_handler, handlers::system::routes_handler),
    components(schemas(
        handlers::system::HealthResponse,
        dto::RoutesResponse,
        dto::ModuleDto,
        dto::ControllerDto,
        dto::CommandDto,
        dto::StatsDto,
    )),
    tags((name = "System", description = "Health and routing diagnostics"))
)]
pub struct ApiDoc;

/// Builds the diagnostics router, with Swagger UI when the `swagger-ui`
/// feature is enabled.
pub fn build_router() -> Router<AppState> {
    let router = Router::new().merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}
