/// Authentication and authorization
///
/// # Modules
///
/// - [`keystore`]: Rotated RSA signing keys from a file, AWS Secrets Manager, or memory
/// - [`jwt`]: RS256 bearer token issue and verification
/// - [`claims`]: The verified token payload passed to every repository call
/// - [`acl`]: The tenant-isolation predicate and role gates
/// - [`password`]: Salted Argon2id password hashing
/// - [`flow`]: Sign-in, account switching, and password changes
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use chrono::{Duration, Utc};
/// use launchpad_shared::auth::{flow, jwt::Authenticator};
/// use launchpad_shared::auth::keystore::{KeyStore, MemoryKeySource, RotationPolicy};
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let keys = KeyStore::new(Arc::new(MemoryKeySource::new()), RotationPolicy::new(Duration::hours(24)), Utc::now()).await?;
/// let authenticator = Authenticator::new(Arc::new(keys));
///
/// let grant = flow::authenticate(&pool, &authenticator, "lee@frontier.test", "pw!Fr0nt1er", Duration::minutes(60), Utc::now()).await?;
/// let claims = authenticator.verify(&grant.token)?;
/// # Ok(())
/// # }
/// ```

pub mod acl;
pub mod claims;
pub mod flow;
pub mod jwt;
pub mod keystore;
pub mod password;
