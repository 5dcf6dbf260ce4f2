/// Claims-scoped access control
///
/// Tenant isolation is enforced by composing a predicate into every query
/// against users, accounts, memberships, and projects. The predicate is always
/// an `IN (subquery)` over non-archived memberships, never a join, so it can be
/// ANDed onto any caller-supplied filter without changing row multiplicity.
///
/// ```sql
/// <outer> IN (SELECT m.<scope> FROM users_accounts m
///             WHERE m.archived_at IS NULL
///               AND (m.account_id = :audience OR m.user_id = :subject))
/// ```
///
/// | Scope             | Outer column               | Subquery column |
/// |-------------------|----------------------------|-----------------|
/// | `User`            | `users.id` (or own row)    | `user_id`       |
/// | `Account`         | `accounts.id`              | `account_id`    |
/// | `Membership`      | `users_accounts.user_id`   | `user_id`       |
/// | `AccountResource` | `<table>.account_id`       | `account_id`    |
///
/// Internal claims get no predicate.
///
/// Writes use the read predicate first (a hidden row is `NotFound`) and then one
/// of the role gates below (`Forbidden`).

use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::error::{Error, Result};
use crate::models::membership::Role;

/// How a table is tied to the membership graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    User,
    Account,
    Membership,
    /// Any table with an `account_id` column, such as projects
    AccountResource,
}

impl Scope {
    fn columns(self) -> (&'static str, &'static str) {
        match self {
            Scope::User => ("id", "user_id"),
            Scope::Account => ("id", "account_id"),
            Scope::Membership => ("user_id", "user_id"),
            Scope::AccountResource => ("account_id", "account_id"),
        }
    }
}

/// Appends ` AND <predicate>` for `claims` to a query over `table`
///
/// Does nothing for internal claims.
pub fn push_read_predicate(
    qb: &mut QueryBuilder<'_, Postgres>,
    claims: &Claims,
    scope: Scope,
    table: &str,
) {
    if claims.is_internal() {
        return;
    }

    let (outer, inner) = scope.columns();

    qb.push(" AND (");
    qb.push(table).push(".").push(outer);
    qb.push(" IN (SELECT m.").push(inner);
    qb.push(" FROM users_accounts m WHERE m.archived_at IS NULL AND (m.account_id = ");
    qb.push_bind(claims.audience);
    qb.push(" OR m.user_id = ");
    qb.push_bind(claims.subject);
    qb.push("))");

    if scope == Scope::User {
        qb.push(" OR ").push(table).push(".id = ");
        qb.push_bind(claims.subject);
    }

    qb.push(")");
}

/// Mutations of an account or anything scoped to it
///
/// Requires internal claims, or `audience == account_id` with the admin role.
pub fn require_admin(claims: &Claims, account_id: Uuid) -> Result<()> {
    if claims.is_internal() || claims.is_admin_of(account_id) {
        Ok(())
    } else {
        tracing::debug!(subject = %claims.subject, account_id = %account_id, "Admin role required");
        Err(Error::Forbidden)
    }
}

/// Mutations of a user row other than the caller's own
///
/// Requires internal claims or the admin role in the caller's audience. The
/// target must already have passed the read predicate.
pub fn require_user_admin(claims: &Claims) -> Result<()> {
    if claims.is_internal() || claims.has_role(Role::Admin) {
        Ok(())
    } else {
        tracing::debug!(subject = %claims.subject, "Admin role required for user mutation");
        Err(Error::Forbidden)
    }
}

/// Updates of a user row: the caller themself or an admin
pub fn require_self_or_admin(claims: &Claims, user_id: Uuid) -> Result<()> {
    if claims.subject == user_id && !user_id.is_nil() {
        return Ok(());
    }
    require_user_admin(claims)
}
