//! Persistence seam for avatar generation jobs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use avatarhub_core::result::AppResult;

use super::model::{AvatarJob, NewAvatarJob};
use super::status::JobStatus;

/// Store for avatar generation jobs.
///
/// Implemented over PostgreSQL in `avatarhub-database`; the worker crate's
/// tests substitute an in-memory double.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// Insert a new pending job.
    async fn insert(&self, new: &NewAvatarJob) -> AppResult<AvatarJob>;

    /// Find a job by id.
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<AvatarJob>>;

    /// Find the active (pending or processing) job for an avatar, if any.
    async fn find_active_for_avatar(&self, avatar_id: Uuid) -> AppResult<Option<AvatarJob>>;

    /// Fetch pending jobs oldest-first.
    async fn find_pending(&self, limit: i64) -> AppResult<Vec<AvatarJob>>;

    /// Fetch processing jobs that track a detached process.
    async fn find_processing_with_pid(&self) -> AppResult<Vec<AvatarJob>>;

    /// Count jobs with the given status.
    async fn count_with_status(&self, status: JobStatus) -> AppResult<i64>;

    /// Count jobs that reached `status` at or after `since`.
    async fn count_finished_since(
        &self,
        status: JobStatus,
        since: DateTime<Utc>,
    ) -> AppResult<i64>;

    /// Move a job to processing, stamping `started_at` and incrementing
    /// the attempt counter. Returns the updated job.
    async fn begin_attempt(&self, id: Uuid) -> AppResult<Option<AvatarJob>>;

    /// Record the detached process and log path for a dispatched CLI run.
    async fn record_dispatch(&self, id: Uuid, pid: i64, log_path: &str) -> AppResult<()>;

    /// Return a failed attempt to the pending queue, keeping the attempt
    /// count and clearing process tracking.
    async fn requeue(&self, id: Uuid, error_message: &str) -> AppResult<()>;

    /// Mark a job completed with its result key.
    async fn complete(
        &self,
        id: Uuid,
        result_key: &str,
        remote_job_ref: Option<&str>,
    ) -> AppResult<()>;

    /// Mark a job terminally failed.
    async fn fail(&self, id: Uuid, error_message: &str) -> AppResult<()>;

    /// Reset a failed job for a fresh round of attempts. Returns the
    /// updated job, or `None` when the job is missing or not failed.
    async fn reset_for_retry(&self, id: Uuid) -> AppResult<Option<AvatarJob>>;
}
