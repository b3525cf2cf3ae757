//! Persistence seam for avatar resources.

use async_trait::async_trait;
use uuid::Uuid;

use avatarhub_core::result::AppResult;

use super::model::Avatar;
use super::status::ProcessingStage;

/// Store for avatar resources, scoped to what the job subsystem needs.
#[async_trait]
pub trait AvatarStore: Send + Sync + 'static {
    /// Find an avatar by id.
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Avatar>>;

    /// Mark processing as started: status processing, stage preparing,
    /// progress at the preparing band start.
    async fn begin_processing(&self, id: Uuid) -> AppResult<()>;

    /// Update stage and progress percentage.
    async fn update_progress(
        &self,
        id: Uuid,
        stage: ProcessingStage,
        percent: i32,
    ) -> AppResult<()>;

    /// Mark the avatar completed with its archive key and the execution
    /// mode that produced it.
    async fn complete(&self, id: Uuid, result_key: &str, execution_mode: &str) -> AppResult<()>;

    /// Mark the avatar failed, keeping its last progress value.
    async fn fail(&self, id: Uuid, error_message: &str) -> AppResult<()>;

    /// Reset the avatar to pending (manual retry), clearing error state
    /// and progress.
    async fn reset_pending(&self, id: Uuid) -> AppResult<()>;
}
