//! Avatar job repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use avatarhub_core::error::{AppError, ErrorKind};
use avatarhub_core::result::AppResult;
use avatarhub_entity::job::model::{AvatarJob, NewAvatarJob};
use avatarhub_entity::job::status::JobStatus;
use avatarhub_entity::job::store::JobStore;

/// Repository for avatar generation jobs.
///
/// A partial unique index on `avatar_id` (active statuses only) backs the
/// one-active-job-per-avatar invariant; a racing insert surfaces as a
/// `Conflict` error.
#[derive(Debug, Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    /// Create a new job repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for JobRepository {
    async fn insert(&self, new: &NewAvatarJob) -> AppResult<AvatarJob> {
        sqlx::query_as::<_, AvatarJob>(
            "INSERT INTO avatar_jobs (avatar_id, owner_id, max_attempts) \
             VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(new.avatar_id)
        .bind(new.owner_id)
        .bind(new.max_attempts)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::conflict("An active job already exists for this avatar")
            }
            _ => AppError::with_source(ErrorKind::Database, "Failed to create job", e),
        })
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<AvatarJob>> {
        sqlx::query_as::<_, AvatarJob>("SELECT * FROM avatar_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find job", e))
    }

    async fn find_active_for_avatar(&self, avatar_id: Uuid) -> AppResult<Option<AvatarJob>> {
        sqlx::query_as::<_, AvatarJob>(
            "SELECT * FROM avatar_jobs \
             WHERE avatar_id = $1 AND status IN ('pending', 'processing')",
        )
        .bind(avatar_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find active job", e))
    }

    async fn find_pending(&self, limit: i64) -> AppResult<Vec<AvatarJob>> {
        sqlx::query_as::<_, AvatarJob>(
            "SELECT * FROM avatar_jobs WHERE status = 'pending' \
             ORDER BY created_at ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list pending jobs", e))
    }

    async fn find_processing_with_pid(&self) -> AppResult<Vec<AvatarJob>> {
        sqlx::query_as::<_, AvatarJob>(
            "SELECT * FROM avatar_jobs \
             WHERE status = 'processing' AND process_id IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list detached jobs", e)
        })
    }

    async fn count_with_status(&self, status: JobStatus) -> AppResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM avatar_jobs WHERE status = $1")
            .bind(status)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count jobs", e))
    }

    async fn count_finished_since(
        &self,
        status: JobStatus,
        since: DateTime<Utc>,
    ) -> AppResult<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM avatar_jobs WHERE status = $1 AND completed_at >= $2",
        )
        .bind(status)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count jobs", e))
    }

    async fn begin_attempt(&self, id: Uuid) -> AppResult<Option<AvatarJob>> {
        sqlx::query_as::<_, AvatarJob>(
            "UPDATE avatar_jobs SET status = 'processing', started_at = NOW(), \
             attempts = attempts + 1, updated_at = NOW() \
             WHERE id = $1 AND status = 'pending' RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to begin attempt", e))
    }

    async fn record_dispatch(&self, id: Uuid, pid: i64, log_path: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE avatar_jobs SET process_id = $2, output_log_path = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(pid)
        .bind(log_path)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to record dispatch", e))?;
        Ok(())
    }

    async fn requeue(&self, id: Uuid, error_message: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE avatar_jobs SET status = 'pending', error_message = $2, \
             process_id = NULL, output_log_path = NULL, updated_at = NOW() \
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to requeue job", e))?;
        Ok(())
    }

    async fn complete(
        &self,
        id: Uuid,
        result_key: &str,
        remote_job_ref: Option<&str>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE avatar_jobs SET status = 'completed', completed_at = NOW(), \
             result_key = $2, remote_job_ref = COALESCE($3, remote_job_ref), \
             error_message = NULL, process_id = NULL, output_log_path = NULL, \
             updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(result_key)
        .bind(remote_job_ref)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to complete job", e))?;
        Ok(())
    }

    async fn fail(&self, id: Uuid, error_message: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE avatar_jobs SET status = 'failed', completed_at = NOW(), \
             error_message = $2, process_id = NULL, output_log_path = NULL, \
             updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to mark job as failed", e))?;
        Ok(())
    }

    async fn reset_for_retry(&self, id: Uuid) -> AppResult<Option<AvatarJob>> {
        sqlx::query_as::<_, AvatarJob>(
            "UPDATE avatar_jobs SET status = 'pending', attempts = 0, \
             error_message = NULL, started_at = NULL, completed_at = NULL, \
             remote_job_ref = NULL, updated_at = NOW() \
             WHERE id = $1 AND status = 'failed' RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to retry job", e))
    }
}
