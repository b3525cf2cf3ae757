//! Terminal-state notifications.

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use avatarhub_core::traits::notify::JobNotifier;

/// Notifier that records terminal transitions in the log stream. Stands in
/// for the outbound mail integration, which lives outside this service.
#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl JobNotifier for TracingNotifier {
    async fn generation_completed(&self, owner_id: Uuid, avatar_name: &str) {
        info!(%owner_id, avatar_name, "Avatar generation completed");
    }

    async fn generation_failed(&self, owner_id: Uuid, avatar_name: &str, error: &str) {
        warn!(%owner_id, avatar_name, error, "Avatar generation failed");
    }
}
