/// Embedded schema migrations
///
/// The SQL lives in `migrations/` at the workspace root and is compiled into
/// the binary, so a deployed API never needs the files on disk.

use sqlx::postgres::PgPool;
use tracing::{error, info};

use crate::error::{Error, Result};

/// Applies every pending migration
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Running database migrations");

    sqlx::migrate!("../migrations").run(pool).await.map_err(|e| {
        error!(error = %e, "Migration failed");
        Error::Internal(format!("Migration failed: {}", e))
    })?;

    info!("Database migrations complete");
    Ok(())
}

/// Versions of the migrations applied so far, oldest first
pub async fn applied_versions(pool: &PgPool) -> Result<Vec<i64>> {
    sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success ORDER BY version")
        .fetch_all(pool)
        .await
        .map_err(crate::error::db_err("migrations.applied_versions"))
}
