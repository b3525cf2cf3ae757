//! Avatar entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::status::{AvatarStatus, ProcessingStage};

/// An avatar resource: a lip-sync model trained from a user's source video.
///
/// The job subsystem reads the input fields and mirrors processing state
/// onto this row; it never creates or deletes avatars.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Avatar {
    /// Unique avatar identifier.
    pub id: Uuid,
    /// Owning user.
    pub owner_id: Uuid,
    /// Display name.
    pub name: String,
    /// Storage key of the uploaded source video.
    pub source_video_key: Option<String>,
    /// Local filesystem path of the source video, when the upload happened
    /// on this host.
    pub local_video_path: Option<String>,
    /// Storage key of the generated avatar archive.
    pub result_key: Option<String>,
    /// How the avatar was generated: `"cli"` or `"api"`.
    pub execution_mode: Option<String>,
    /// Lifecycle status.
    pub status: AvatarStatus,
    /// Overall progress, 0-100.
    pub progress_percent: i32,
    /// Current processing stage.
    pub stage: ProcessingStage,
    /// Error message from the last terminal failure.
    pub error_message: Option<String>,
    /// When processing started.
    pub processing_started_at: Option<DateTime<Utc>>,
    /// When processing finished (success or failure).
    pub processing_completed_at: Option<DateTime<Utc>>,
    /// When the avatar was created.
    pub created_at: DateTime<Utc>,
    /// When the avatar was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Avatar {
    /// Whether the avatar has a source video to generate from.
    pub fn has_source_video(&self) -> bool {
        self.source_video_key.is_some()
    }
}
