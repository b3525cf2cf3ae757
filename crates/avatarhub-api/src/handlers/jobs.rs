//! Job control handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use avatarhub_worker::scheduler::QueueStatus;

use crate::dto::request::CreateJobRequest;
use crate::dto::response::JobResponse;
use crate::error::ApiError;
use crate::extractors::ApiKey;
use crate::state::AppState;

/// POST /internal/avatar/jobs
///
/// Creates a generation job for an avatar. Returns the avatar's existing
/// active job instead of creating a duplicate.
pub async fn create_job(
    State(state): State<AppState>,
    _auth: ApiKey,
    Json(body): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<JobResponse>), ApiError> {
    let job = state.scheduler.create_job(body.avatar_id).await?;
    Ok((StatusCode::ACCEPTED, Json(job.into())))
}

/// GET /internal/avatar/jobs/status
pub async fn queue_status(
    State(state): State<AppState>,
    _auth: ApiKey,
) -> Result<Json<QueueStatus>, ApiError> {
    let status = state.scheduler.queue_status().await?;
    Ok(Json(status))
}

/// GET /internal/avatar/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    _auth: ApiKey,
    Path(id): Path<Uuid>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = state.scheduler.get_job(id).await?;
    Ok(Json(job.into()))
}

/// POST /internal/avatar/jobs/{id}/retry
///
/// Resets a terminally failed job for a fresh round of attempts. Responds
/// 404 when the job does not exist or is not in a retryable state.
pub async fn retry_job(
    State(state): State<AppState>,
    _auth: ApiKey,
    Path(id): Path<Uuid>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = state.scheduler.retry_job(id).await?;
    Ok(Json(job.into()))
}
