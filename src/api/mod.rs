//! REST API layer: route handlers, DTOs, OpenAPI document, and router
//! composition.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` and the docs
//! live at the root.

pub mod dto;
pub mod handlers;
pub mod openapi;

use axum::Router;

use crate::app_state::AppState;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());
    with_docs(router)
}

#[cfg(feature = "swagger-ui")]
fn with_docs(router: Router<AppState>) -> Router<AppState> {
    use utoipa::OpenApi;
    use utoipa_swagger_ui::SwaggerUi;

    router.merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

#[cfg(not(feature = "swagger-ui"))]
fn with_docs(router: Router<AppState>) -> Router<AppState> {
    use axum::Json;
    use axum::routing::get;
    use utoipa::OpenApi;

    router.route(
        "/api-docs/openapi.json",
        get(|| async { Json(openapi::ApiDoc::openapi()) }),
    )
}
