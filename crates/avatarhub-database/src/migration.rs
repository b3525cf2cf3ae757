//! Embedded schema migrations.

use sqlx::migrate::Migrator;
use sqlx::PgPool;
use tracing::info;

use avatarhub_core::error::{AppError, ErrorKind};
use avatarhub_core::result::AppResult;

/// Migrations compiled in from the workspace `migrations/` directory.
static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Apply any migrations the database has not recorded yet.
pub async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    MIGRATOR.run(pool).await.map_err(|e| {
        AppError::with_source(ErrorKind::Database, format!("Migration failed: {e}"), e)
    })?;

    info!(known = MIGRATOR.iter().count(), "Database schema is current");
    Ok(())
}
