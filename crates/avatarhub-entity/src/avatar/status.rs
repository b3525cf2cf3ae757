//! Avatar status and processing stage enumerations.

use serde::{Deserialize, Serialize};
use std::fmt;

use avatarhub_core::progress;

/// Lifecycle status of an avatar resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "avatar_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AvatarStatus {
    /// Created, no processing yet.
    Pending,
    /// Source video upload in progress.
    Uploading,
    /// Generation job running.
    Processing,
    /// Avatar archive available.
    Completed,
    /// Generation failed terminally.
    Failed,
}

impl AvatarStatus {
    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for AvatarStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Processing stage of an avatar, driving the progress bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "processing_stage", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStage {
    /// Waiting to start.
    Pending,
    /// Uploading source video (0-10%).
    Uploading,
    /// Downloading and preparing input (10-20%).
    Preparing,
    /// Avatar training (20-80%, estimator-driven).
    Training,
    /// Packaging and uploading results (80-100%).
    Finalizing,
    /// Done (100%).
    Completed,
    /// Error state; progress keeps its last value.
    Failed,
}

impl ProcessingStage {
    /// Default progress percentage when entering this stage without an
    /// explicit value.
    pub fn default_percent(&self) -> i32 {
        match self {
            Self::Pending => 0,
            Self::Uploading => progress::UPLOAD_START,
            Self::Preparing => progress::PREPARE_START,
            Self::Training => progress::TRAINING_START,
            Self::Finalizing => progress::FINALIZE_START,
            Self::Completed => 100,
            Self::Failed => 0,
        }
    }

    /// Return the stage as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Preparing => "preparing",
            Self::Training => "training",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
