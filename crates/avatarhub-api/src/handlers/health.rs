//! Health check handler.

use axum::extract::State;
use axum::Json;

use crate::dto::response::HealthResponse;
use crate::state::AppState;

/// GET /health
///
/// Unauthenticated liveness probe with a database connectivity check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match state.db.health_check().await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            "unavailable"
        }
    };

    Json(HealthResponse {
        status: if database == "connected" { "ok" } else { "degraded" }.to_string(),
        database: database.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
