/// Sign-in, account switching, and password changes
///
/// Every credential failure surfaces as `Error::AuthenticationFailure` with no
/// further detail: an unknown email, a wrong password, and a user without
/// memberships are indistinguishable to the caller. The reason is logged at
/// debug level.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Acquire, Postgres};
use uuid::Uuid;
use validator::Validate;

use crate::auth::acl;
use crate::auth::claims::Claims;
use crate::auth::jwt::Authenticator;
use crate::auth::password::{self, generate_reset_token};
use crate::error::{db_err, Error, Result};
use crate::models::membership::Membership;
use crate::models::user::{strong_password, User};
use crate::validation::validate;

/// A freshly issued token and the claims it carries
#[derive(Debug, Clone, Serialize)]
pub struct TokenGrant {
    pub token: String,
    pub claims: Claims,
}

/// A new password and its confirmation
#[derive(Clone, Deserialize, Validate)]
pub struct PasswordChange {
    #[validate(custom(function = "strong_password"))]
    pub password: String,

    #[validate(must_match(other = "password", message = "passwords do not match"))]
    pub password_confirm: String,
}

impl PasswordChange {
    pub fn new(password: impl Into<String>, password_confirm: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            password_confirm: password_confirm.into(),
        }
    }
}

impl std::fmt::Debug for PasswordChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PasswordChange { .. }")
    }
}

fn rejected(reason: &'static str) -> Error {
    tracing::debug!(reason, "Authentication rejected");
    Error::AuthenticationFailure
}

/// Verifies `email` and `password` and issues a token
///
/// The token's audience is the user's oldest live membership; `account_ids`
/// lists every live membership.
pub async fn authenticate<'c, A>(
    db: A,
    authenticator: &Authenticator,
    email: &str,
    password: &str,
    session_ttl: Duration,
    now: DateTime<Utc>,
) -> Result<TokenGrant>
where
    A: Acquire<'c, Database = Postgres>,
{
    let mut conn = db.acquire().await.map_err(db_err("auth.authenticate"))?;

    let user = User::find_by_email(&mut *conn, email)
        .await?
        .ok_or_else(|| rejected("unknown email"))?;

    let matches = password::verify_password_blocking(
        password.to_string(),
        user.password_salt.clone(),
        user.password_hash.clone(),
    )
    .await?;
    if !matches {
        return Err(rejected("wrong password"));
    }

    let memberships = Membership::for_user(&mut *conn, &Claims::internal(), user.id).await?;
    let first = memberships.first().ok_or_else(|| rejected("no memberships"))?;

    let claims = Claims::new(
        user.id,
        first.account_id,
        memberships.iter().map(|m| m.account_id).collect(),
        first.roles.clone(),
        now,
        session_ttl,
    );
    let token = authenticator.issue(&claims)?;

    tracing::info!(user_id = %user.id, account_id = %claims.audience, "User authenticated");
    Ok(TokenGrant { token, claims })
}

/// Re-issues a token bound to `account_id`
///
/// The target must be in the caller's `account_ids` and the membership must
/// still be live.
pub async fn switch_account<'c, A>(
    db: A,
    authenticator: &Authenticator,
    claims: &Claims,
    account_id: Uuid,
    session_ttl: Duration,
    now: DateTime<Utc>,
) -> Result<TokenGrant>
where
    A: Acquire<'c, Database = Postgres>,
{
    if !claims.can_switch_to(account_id) {
        return Err(rejected("account not in token"));
    }

    let membership = Membership::find_pair(db, &Claims::internal(), claims.subject, account_id, false)
        .await?
        .ok_or_else(|| rejected("membership gone"))?;

    let switched = Claims::new(
        claims.subject,
        account_id,
        claims.account_ids.clone(),
        membership.roles,
        now,
        session_ttl,
    );
    let token = authenticator.issue(&switched)?;

    tracing::info!(user_id = %claims.subject, account_id = %account_id, "Account switched");
    Ok(TokenGrant {
        token,
        claims: switched,
    })
}

/// Sets a new password for `user_id`
///
/// Allowed for the user themself, or for an admin of the caller's audience
/// who can see the user. The salt is re-rolled and any reset token cleared.
pub async fn update_password<'c, A>(
    db: A,
    claims: &Claims,
    user_id: Uuid,
    change: PasswordChange,
    now: DateTime<Utc>,
) -> Result<User>
where
    A: Acquire<'c, Database = Postgres>,
{
    validate(&change)?;

    let mut conn = db.acquire().await.map_err(db_err("auth.update_password"))?;

    User::read(&mut *conn, claims, user_id, false).await?;
    acl::require_self_or_admin(claims, user_id)?;

    let salt = password::generate_salt();
    let hash = password::hash_password_blocking(change.password, salt.clone()).await?;
    let user = User::store_password(&mut *conn, user_id, &salt, &hash, now).await?;

    tracing::info!(user_id = %user_id, "Password updated");
    Ok(user)
}

/// Starts a password reset for `email`
///
/// Returns the reset token for delivery to the user, or `None` when no live
/// user has that email. Callers must not reveal which.
pub async fn begin_password_reset<'c, A>(db: A, email: &str, now: DateTime<Utc>) -> Result<Option<String>>
where
    A: Acquire<'c, Database = Postgres>,
{
    let mut conn = db.acquire().await.map_err(db_err("auth.begin_password_reset"))?;

    let Some(user) = User::find_by_email(&mut *conn, email).await? else {
        tracing::debug!("Password reset requested for unknown email");
        return Ok(None);
    };

    let token = generate_reset_token();
    User::store_reset_token(&mut *conn, user.id, Some(&token), now).await?;

    tracing::info!(user_id = %user.id, "Password reset started");
    Ok(Some(token))
}

/// Completes a reset started by [`begin_password_reset`]
pub async fn complete_password_reset<'c, A>(
    db: A,
    token: &str,
    change: PasswordChange,
    now: DateTime<Utc>,
) -> Result<User>
where
    A: Acquire<'c, Database = Postgres>,
{
    validate(&change)?;
    if token.is_empty() {
        return Err(rejected("empty reset token"));
    }

    let mut conn = db.acquire().await.map_err(db_err("auth.complete_password_reset"))?;

    let user = User::find_by_reset_token(&mut *conn, token)
        .await?
        .ok_or_else(|| rejected("unknown reset token"))?;

    let salt = password::generate_salt();
    let hash = password::hash_password_blocking(change.password, salt.clone()).await?;
    let user = User::store_password(&mut *conn, user.id, &salt, &hash, now).await?;

    tracing::info!(user_id = %user.id, "Password reset completed");
    Ok(user)
}
