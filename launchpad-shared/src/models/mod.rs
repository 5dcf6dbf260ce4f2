/// Database models for Launchpad
///
/// Each model carries its own repository operations. Every operation takes
/// `&Claims` explicitly and any sqlx `Acquire` (pool, connection, or open
/// transaction); reads are scoped by the ACL predicate and writes pass the
/// role gates in [`crate::auth::acl`].
///
/// # Models
///
/// - `user`: People who sign in
/// - `account`: Tenants
/// - `membership`: User-account links with roles and status
/// - `project`: Account-scoped resources

pub mod account;
pub mod membership;
pub mod project;
pub mod user;

/// Timezone given to users and accounts created without one
pub const DEFAULT_TIMEZONE: &str = "America/Anchorage";
