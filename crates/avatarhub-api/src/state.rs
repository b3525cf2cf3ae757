//! Application state shared across all handlers.

use std::sync::Arc;

use avatarhub_core::config::AppConfig;
use avatarhub_database::connection::DatabasePool;
use avatarhub_worker::scheduler::JobScheduler;

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`. All fields are
/// cheap to clone across tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Database pool, used directly only by the health probe
    pub db: DatabasePool,
    /// Job scheduler
    pub scheduler: Arc<JobScheduler>,
}
