//! Axum router construction.
//!
//! Builds the full application router with all route groups and middleware
//! layers.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::context::AppContext;
use crate::middleware::auth::{auth_middleware, optional_auth_middleware};
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

/// Slack for multipart framing and text fields on top of the file limits.
const FORM_OVERHEAD_BYTES: u64 = 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health_check,
        routes::upload::upload_asset,
        routes::assets::get_asset,
        routes::files::serve_asset,
    ),
    components(schemas(
        routes::health::HealthResponse,
        routes::upload::UploadForm,
        routes::assets::UploadResponse,
        routes::assets::AssetSummary,
        routes::assets::AssetDetailResponse,
        routes::assets::AssetDetail,
        routes::assets::ChannelSummary,
        vs_core::AssetStatus,
        vs_core::Privacy,
        vs_core::ThumbnailSource,
        vs_core::ProcessingJournal,
        vs_core::JournalStatus,
    ))
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let ingest = &ctx.config.ingest;
    let body_limit = ingest
        .max_video_bytes
        .saturating_add(ingest.max_thumbnail_bytes)
        .saturating_add(FORM_OVERHEAD_BYTES);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    // Uploads require a caller.
    let protected_routes = Router::new()
        .route("/assets", post(routes::upload::upload_asset))
        .layer(DefaultBodyLimit::max(body_limit))
        .route_layer(middleware::from_fn_with_state(ctx.clone(), auth_middleware));

    // Reads resolve a caller when one is given.
    let public_api = Router::new()
        .route("/assets/{id}", get(routes::assets::get_asset))
        .route_layer(middleware::from_fn_with_state(
            ctx.clone(),
            optional_auth_middleware,
        ));

    let delivery = Router::new()
        .route("/assets/{*path}", get(routes::files::serve_asset))
        .route_layer(middleware::from_fn_with_state(
            ctx.clone(),
            optional_auth_middleware,
        ));

    let api = protected_routes.merge(public_api);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/api", api)
        .merge(delivery)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| p.as_str() == "/api/assets"));
        assert!(paths.iter().any(|p| p.as_str() == "/api/assets/{id}"));
        assert!(paths.iter().any(|p| p.as_str() == "/health"));
    }
}
