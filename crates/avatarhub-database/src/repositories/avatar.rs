//! Avatar repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use avatarhub_core::error::{AppError, ErrorKind};
use avatarhub_core::result::AppResult;
use avatarhub_entity::avatar::model::Avatar;
use avatarhub_entity::avatar::status::ProcessingStage;
use avatarhub_entity::avatar::store::AvatarStore;

/// Repository for avatar resources.
///
/// Only the processing-related columns are written here; avatar creation
/// and deletion belong to the upload surface, not the job subsystem.
#[derive(Debug, Clone)]
pub struct AvatarRepository {
    pool: PgPool,
}

impl AvatarRepository {
    /// Create a new avatar repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AvatarStore for AvatarRepository {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Avatar>> {
        sqlx::query_as::<_, Avatar>("SELECT * FROM avatars WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find avatar", e))
    }

    async fn begin_processing(&self, id: Uuid) -> AppResult<()> {
        sqlx::query(
            "UPDATE avatars SET status = 'processing', stage = 'preparing', \
             progress_percent = 10, processing_started_at = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to start avatar processing", e)
        })?;
        Ok(())
    }

    async fn update_progress(
        &self,
        id: Uuid,
        stage: ProcessingStage,
        percent: i32,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE avatars SET stage = $2, progress_percent = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(stage)
        .bind(percent)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to update avatar progress", e)
        })?;
        Ok(())
    }

    async fn complete(&self, id: Uuid, result_key: &str, execution_mode: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE avatars SET status = 'completed', stage = 'completed', \
             progress_percent = 100, result_key = $2, execution_mode = $3, \
             error_message = NULL, processing_completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(result_key)
        .bind(execution_mode)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to complete avatar", e))?;
        Ok(())
    }

    async fn fail(&self, id: Uuid, error_message: &str) -> AppResult<()> {
        // progress_percent is left alone so the UI shows where it failed.
        sqlx::query(
            "UPDATE avatars SET status = 'failed', stage = 'failed', \
             error_message = $2, processing_completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to mark avatar as failed", e)
        })?;
        Ok(())
    }

    async fn reset_pending(&self, id: Uuid) -> AppResult<()> {
        sqlx::query(
            "UPDATE avatars SET status = 'pending', stage = 'pending', \
             progress_percent = 0, error_message = NULL, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to reset avatar", e))?;
        Ok(())
    }
}
