//! Notification seam for job completion and failure.

use async_trait::async_trait;
use uuid::Uuid;

/// Best-effort notification hook invoked when a job reaches a terminal
/// state. Implementations must not fail the state transition; errors are
/// theirs to log and swallow.
#[async_trait]
pub trait JobNotifier: Send + Sync + 'static {
    /// Called after an avatar finished generating successfully.
    async fn generation_completed(&self, owner_id: Uuid, avatar_name: &str);

    /// Called after a job exhausted its attempts and failed for good.
    async fn generation_failed(&self, owner_id: Uuid, avatar_name: &str, error: &str);
}
