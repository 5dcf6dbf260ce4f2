/// Database layer for Launchpad
///
/// # Modules
///
/// - `pool`: PostgreSQL connection pool management with health checks
/// - `migrations`: Embedded schema migrations
/// - `query`: The claims-scoped `SELECT` builder shared by every repository
///
/// Repository functions are generic over [`sqlx::Acquire`], so callers can pass
/// `&PgPool`, a `&mut PgConnection`, or `&mut *tx` of an open transaction.
///
/// # Example
///
/// ```no_run
/// use launchpad_shared::db::pool::{create_pool, DatabaseConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = DatabaseConfig::new(std::env::var("DATABASE_URL")?);
///     let pool = create_pool(config).await?;
///     Ok(())
/// }
/// ```

pub mod migrations;
pub mod pool;
pub mod query;

use std::future::Future;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Truncates an instant to millisecond precision
///
/// Every timestamp written by a repository goes through here, so a value read
/// back from Postgres compares equal to the value that was written.
pub fn truncate_ms(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(TimeDelta::milliseconds(1)).unwrap_or(at)
}

/// Races `fut` against `token`
///
/// When the token fires first the future is dropped, which rolls back any
/// transaction it had open, and `Error::Cancelled` is returned.
///
/// # Example
///
/// ```no_run
/// # use launchpad_shared::db::cancellable;
/// # use launchpad_shared::auth::claims::Claims;
/// # use launchpad_shared::models::user::User;
/// # use tokio_util::sync::CancellationToken;
/// # async fn example(pool: sqlx::PgPool, id: uuid::Uuid) -> launchpad_shared::Result<()> {
/// let token = CancellationToken::new();
/// let user = cancellable(&token, User::read(&pool, &Claims::internal(), id, false)).await?;
/// # Ok(())
/// # }
/// ```
pub async fn cancellable<T, F>(token: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => {
            tracing::debug!("Operation cancelled");
            Err(Error::Cancelled)
        }
        result = fut => result,
    }
}
