//! Job entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::status::JobStatus;

/// An avatar generation job.
///
/// At most one job per avatar may be active (pending or processing) at a
/// time; the store enforces this on insert.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AvatarJob {
    /// Unique job identifier.
    pub id: Uuid,
    /// Avatar this job generates.
    pub avatar_id: Uuid,
    /// Owner of the avatar.
    pub owner_id: Uuid,
    /// Current job status.
    pub status: JobStatus,
    /// Number of started attempts.
    pub attempts: i32,
    /// Attempt budget.
    pub max_attempts: i32,
    /// Error message from the most recent failed attempt.
    pub error_message: Option<String>,
    /// Backend job reference for remote runs.
    pub remote_job_ref: Option<String>,
    /// Storage key of the produced avatar archive (set on completion).
    pub result_key: Option<String>,
    /// Detached pipeline process id for CLI runs in flight.
    pub process_id: Option<i64>,
    /// Path of the detached process's output log.
    pub output_log_path: Option<String>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the current attempt started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
}

impl AvatarJob {
    /// Whether the attempt budget allows another automatic retry.
    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// Data required to create a new job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAvatarJob {
    /// Avatar to generate.
    pub avatar_id: Uuid,
    /// Owner of the avatar.
    pub owner_id: Uuid,
    /// Attempt budget.
    pub max_attempts: i32,
}
