/// Membership model and database operations
///
/// A membership links one user to one account with a non-empty set of roles
/// and a status. At most one non-archived row exists per `(user_id, account_id)`;
/// archived rows are kept and revived by [`Membership::add`].
///
/// # Schema
///
/// ```sql
/// CREATE TYPE user_account_role_t AS ENUM ('admin', 'user');
/// CREATE TYPE user_account_status_t AS ENUM ('active', 'invited', 'disabled');
///
/// CREATE TABLE users_accounts (
///     id UUID PRIMARY KEY,
///     user_id UUID NOT NULL REFERENCES users(id),
///     account_id UUID NOT NULL REFERENCES accounts(id),
///     roles user_account_role_t[] NOT NULL,
///     status user_account_status_t NOT NULL DEFAULT 'active',
///     created_at TIMESTAMPTZ NOT NULL,
///     updated_at TIMESTAMPTZ NOT NULL,
///     archived_at TIMESTAMPTZ
/// );
/// ```
///
/// # Roles
///
/// - **admin**: Manage the account, its memberships, and its projects
/// - **user**: Read access within the account
///
/// # Example
///
/// ```no_run
/// use launchpad_shared::auth::claims::Claims;
/// use launchpad_shared::models::membership::{AddMembership, Membership, Role};
/// use uuid::Uuid;
///
/// # async fn example(pool: sqlx::PgPool, claims: Claims, user_id: Uuid) -> launchpad_shared::Result<()> {
/// let membership = Membership::add(&pool, &claims, AddMembership {
///     user_id,
///     account_id: claims.audience,
///     roles: vec![Role::User],
///     status: None,
/// }, chrono::Utc::now()).await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgHasArrayType, PgTypeInfo};
use sqlx::{Acquire, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use crate::auth::acl::{self, Scope};
use crate::auth::claims::Claims;
use crate::db::query::{self, FindRequest, Record};
use crate::db::truncate_ms;
use crate::error::{db_err, Error, Result};
use crate::models::account::Account;
use crate::models::user::User;
use crate::validation::validate;

/// Roles a user holds within an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_account_role_t", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl PgHasArrayType for Role {
    fn array_type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("_user_account_role_t")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_account_status_t", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    #[default]
    Active,
    Invited,
    Disabled,
}

/// A user's membership in an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Membership {
    pub id: Uuid,
    pub user_id: Uuid,
    pub account_id: Uuid,

    /// Never empty
    pub roles: Vec<Role>,

    pub status: MembershipStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl Record for Membership {
    const TABLE: &'static str = "users_accounts";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "user_id",
        "account_id",
        "roles",
        "status",
        "created_at",
        "updated_at",
        "archived_at",
    ];
    const SCOPE: Scope = Scope::Membership;
}

const RETURNING: &str =
    " RETURNING id, user_id, account_id, roles, status, created_at, updated_at, archived_at";

/// Input for adding a user to an account
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AddMembership {
    pub user_id: Uuid,
    pub account_id: Uuid,

    #[validate(length(min = 1, message = "roles must not be empty"))]
    pub roles: Vec<Role>,

    /// Defaults to active
    #[serde(default)]
    pub status: Option<MembershipStatus>,
}

/// Partial update of a membership; `None` fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateMembership {
    #[validate(length(min = 1, message = "roles must not be empty"))]
    pub roles: Option<Vec<Role>>,

    pub status: Option<MembershipStatus>,

    /// Clears `archived_at`
    #[serde(default)]
    pub unarchive: bool,
}

impl Membership {
    pub async fn find<'c, A>(db: A, claims: &Claims, request: &FindRequest) -> Result<Vec<Self>>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        query::find(db, claims, request, "memberships.find").await
    }

    pub async fn read<'c, A>(db: A, claims: &Claims, id: Uuid, include_archived: bool) -> Result<Self>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        query::read(db, claims, id, include_archived, "memberships.read").await
    }

    /// Memberships of `user_id`, oldest first
    pub async fn for_user<'c, A>(db: A, claims: &Claims, user_id: Uuid) -> Result<Vec<Self>>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        let request = FindRequest::new()
            .filter("user_id", user_id)
            .order_by("created_at", false);
        query::find(db, claims, &request, "memberships.for_user").await
    }

    /// The membership linking `user_id` and `account_id`, if visible
    ///
    /// With `include_archived`, a live row is preferred over archived ones.
    pub async fn find_pair<'c, A>(
        db: A,
        claims: &Claims,
        user_id: Uuid,
        account_id: Uuid,
        include_archived: bool,
    ) -> Result<Option<Self>>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        let request = FindRequest::new()
            .filter("user_id", user_id)
            .filter("account_id", account_id)
            .include_archived(include_archived)
            // NULLs sort first when descending
            .order_by("archived_at", true)
            .limit(1);
        let rows: Vec<Self> = query::find(db, claims, &request, "memberships.find_pair").await?;
        Ok(rows.into_iter().next())
    }

    /// Adds `user_id` to `account_id`
    ///
    /// Revives an archived row for the pair when one exists, otherwise inserts.
    /// Requires the admin role in the target account.
    ///
    /// # Errors
    ///
    /// - `Validation` if roles are empty or the user is already a member
    /// - `NotFound` if the account is not visible to the caller or no live
    ///   user has `user_id`
    /// - `Forbidden` if the caller is not an admin of the account
    pub async fn add<'c, A>(
        db: A,
        claims: &Claims,
        data: AddMembership,
        now: DateTime<Utc>,
    ) -> Result<Self>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        validate(&data)?;
        let now = truncate_ms(now);

        let mut tx = db.begin().await.map_err(db_err("memberships.add"))?;

        Account::read(&mut *tx, claims, data.account_id, false).await?;
        acl::require_admin(claims, data.account_id)?;

        User::read(&mut *tx, &Claims::internal(), data.user_id, false).await?;

        let existing =
            Self::find_pair(&mut *tx, &Claims::internal(), data.user_id, data.account_id, true).await?;

        let status = data.status.unwrap_or_default();
        let membership = match existing {
            Some(row) if row.archived_at.is_none() => {
                return Err(Error::field("account_id", "user is already a member of this account"));
            }
            Some(row) => {
                tracing::debug!(membership_id = %row.id, "Reviving archived membership");
                let sql = format!(
                    "UPDATE users_accounts SET roles = $2, status = $3, archived_at = NULL, updated_at = $4 WHERE id = $1{}",
                    RETURNING
                );
                sqlx::query_as::<_, Membership>(&sql)
                    .bind(row.id)
                    .bind(&data.roles)
                    .bind(status)
                    .bind(now)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(db_err("memberships.add"))?
            }
            None => {
                let sql = format!(
                    "INSERT INTO users_accounts (id, user_id, account_id, roles, status, created_at, updated_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $6){}",
                    RETURNING
                );
                sqlx::query_as::<_, Membership>(&sql)
                    .bind(Uuid::new_v4())
                    .bind(data.user_id)
                    .bind(data.account_id)
                    .bind(&data.roles)
                    .bind(status)
                    .bind(now)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(db_err("memberships.add"))?
            }
        };

        tx.commit().await.map_err(db_err("memberships.add"))?;

        tracing::info!(
            membership_id = %membership.id,
            user_id = %membership.user_id,
            account_id = %membership.account_id,
            "Membership added"
        );
        Ok(membership)
    }

    /// Partial update of the membership linking `user_id` and `account_id`
    pub async fn update<'c, A>(
        db: A,
        claims: &Claims,
        user_id: Uuid,
        account_id: Uuid,
        data: UpdateMembership,
        now: DateTime<Utc>,
    ) -> Result<Self>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        validate(&data)?;
        let now = truncate_ms(now);

        let mut conn = db.acquire().await.map_err(db_err("memberships.update"))?;

        let current = Self::find_pair(&mut *conn, claims, user_id, account_id, data.unarchive)
            .await?
            .ok_or(Error::NotFound)?;
        acl::require_admin(claims, account_id)?;

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE users_accounts SET updated_at = ");
        qb.push_bind(now);
        if let Some(roles) = data.roles {
            qb.push(", roles = ").push_bind(roles);
        }
        if let Some(status) = data.status {
            qb.push(", status = ").push_bind(status);
        }
        if data.unarchive {
            qb.push(", archived_at = NULL");
        }
        qb.push(" WHERE id = ").push_bind(current.id);
        qb.push(RETURNING);

        qb.build_query_as::<Membership>()
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err("memberships.update"))
    }

    pub async fn archive<'c, A>(
        db: A,
        claims: &Claims,
        user_id: Uuid,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Self>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        let now = truncate_ms(now);
        let mut conn = db.acquire().await.map_err(db_err("memberships.archive"))?;

        let current = Self::find_pair(&mut *conn, claims, user_id, account_id, false)
            .await?
            .ok_or(Error::NotFound)?;
        acl::require_admin(claims, account_id)?;

        let sql = format!(
            "UPDATE users_accounts SET archived_at = $2, updated_at = $2 WHERE id = $1{}",
            RETURNING
        );
        let membership = sqlx::query_as::<_, Membership>(&sql)
            .bind(current.id)
            .bind(now)
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err("memberships.archive"))?;

        tracing::info!(membership_id = %membership.id, "Membership archived");
        Ok(membership)
    }

    /// Deletes every row for the pair, archived or not
    pub async fn delete<'c, A>(db: A, claims: &Claims, user_id: Uuid, account_id: Uuid) -> Result<()>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        let mut conn = db.acquire().await.map_err(db_err("memberships.delete"))?;

        Self::find_pair(&mut *conn, claims, user_id, account_id, true)
            .await?
            .ok_or(Error::NotFound)?;
        acl::require_admin(claims, account_id)?;

        sqlx::query("DELETE FROM users_accounts WHERE user_id = $1 AND account_id = $2")
            .bind(user_id)
            .bind(account_id)
            .execute(&mut *conn)
            .await
            .map_err(db_err("memberships.delete"))?;

        tracing::info!(user_id = %user_id, account_id = %account_id, "Membership deleted");
        Ok(())
    }
}
