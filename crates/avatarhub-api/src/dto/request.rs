//! Request DTOs.

use serde::Deserialize;
use uuid::Uuid;

/// Body of `POST /internal/avatar/jobs`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobRequest {
    /// Avatar to generate.
    pub avatar_id: Uuid,
}
