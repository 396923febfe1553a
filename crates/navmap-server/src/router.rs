use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handler;
use crate::state::AppState;

/// Build the axum router with all navmap endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/projects/:project/map", get(handler::get_map))
        .route(
            "/v1/projects/:project/diffs",
            get(handler::list_diffs).post(handler::submit_diff),
        )
        .route("/v1/diffs/:diff", get(handler::get_diff))
        .route("/v1/diffs/:diff/merge", post(handler::merge_diff))
        .route("/v1/diffs/:diff/preview", post(handler::preview_diff))
        .route("/v1/diffs/:diff/audit", get(handler::audit_trail))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
