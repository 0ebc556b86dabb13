//! HTTP router construction.
//!
//! Assembles all Axum routes and middleware into a single `Router`.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api;
use crate::state::AppState;

/// Build the complete application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        // Sources
        .route(
            "/api/sources",
            get(api::sources_list).post(api::sources_create),
        )
        .route(
            "/api/sources/{id}",
            get(api::sources_get)
                .put(api::sources_update)
                .delete(api::sources_delete),
        )
        .route("/api/sources/{id}/test", post(api::sources_test))
        // Sync jobs
        .route("/api/sync/trigger", post(api::sync_trigger))
        .route("/api/sync/jobs", get(api::sync_jobs_list))
        .route("/api/sync/jobs/{id}", get(api::sync_job_get))
        .route("/api/sync/jobs/{id}/cancel", post(api::sync_job_cancel))
        // Schedule
        .route(
            "/api/sync/schedule",
            get(api::schedule_get).put(api::schedule_update),
        )
        // Review queue
        .route("/api/review/stats", get(api::review_stats))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
