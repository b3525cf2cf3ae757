//! Route definitions for the AvatarHub internal HTTP surface.

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(job_routes())
        .route("/health", get(handlers::health::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Job control endpoints, guarded by the internal API key.
fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/internal/avatar/jobs", post(handlers::jobs::create_job))
        .route(
            "/internal/avatar/jobs/status",
            get(handlers::jobs::queue_status),
        )
        .route("/internal/avatar/jobs/{id}", get(handlers::jobs::get_job))
        .route(
            "/internal/avatar/jobs/{id}/retry",
            post(handlers::jobs::retry_job),
        )
}
