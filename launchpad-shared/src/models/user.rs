/// User model and database operations
///
/// Users reach accounts through memberships. Emails are stored lower-cased and
/// are unique across live users; archiving a user frees the address.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY,
///     name VARCHAR(200) NOT NULL,
///     email VARCHAR(200) NOT NULL,
///     password_salt VARCHAR(64) NOT NULL,
///     password_hash TEXT NOT NULL,
///     password_reset VARCHAR(128),
///     timezone VARCHAR(64) NOT NULL DEFAULT 'America/Anchorage',
///     created_at TIMESTAMPTZ NOT NULL,
///     updated_at TIMESTAMPTZ NOT NULL,
///     archived_at TIMESTAMPTZ
/// );
///
/// CREATE UNIQUE INDEX users_email_unique ON users (email) WHERE archived_at IS NULL;
/// ```
///
/// # Example
///
/// ```no_run
/// use launchpad_shared::auth::claims::Claims;
/// use launchpad_shared::models::user::{CreateUser, User};
///
/// # async fn example(pool: sqlx::PgPool) -> launchpad_shared::Result<()> {
/// let user = User::create(&pool, &Claims::internal(), CreateUser {
///     name: "Lee".to_string(),
///     email: "lee@frontier.test".to_string(),
///     password: "pw!Fr0nt1er".to_string(),
///     password_confirm: "pw!Fr0nt1er".to_string(),
///     timezone: None,
/// }, chrono::Utc::now()).await?;
///
/// let found = User::find_by_email(&pool, "LEE@frontier.test").await?;
/// assert_eq!(found.map(|u| u.id), Some(user.id));
/// # Ok(())
/// # }
/// ```

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Acquire, PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::auth::acl::{self, Scope};
use crate::auth::claims::Claims;
use crate::auth::password::{self, validate_password_strength};
use crate::db::query::{self, FindRequest, Record};
use crate::db::truncate_ms;
use crate::error::{db_err, Error, Result};
use crate::models::DEFAULT_TIMEZONE;
use crate::validation::{normalize_email, validate};

/// A user
///
/// Password material is never serialized and is left out of `Debug`.
#[derive(Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,

    /// Lower-cased
    pub email: String,

    #[serde(skip_serializing, default)]
    pub password_salt: String,

    /// Argon2id PHC string over `password || password_salt`
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    /// Outstanding reset token, if any
    #[serde(skip_serializing, default)]
    pub password_reset: Option<String>,

    /// IANA zone name
    pub timezone: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("timezone", &self.timezone)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("archived_at", &self.archived_at)
            .finish_non_exhaustive()
    }
}

impl Record for User {
    const TABLE: &'static str = "users";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "email",
        "password_salt",
        "password_hash",
        "password_reset",
        "timezone",
        "created_at",
        "updated_at",
        "archived_at",
    ];
    const PRIVATE: &'static [&'static str] = &["password_salt", "password_hash", "password_reset"];
    const SCOPE: Scope = Scope::User;
}

const RETURNING: &str = " RETURNING id, name, email, password_salt, password_hash, password_reset, \
     timezone, created_at, updated_at, archived_at";

pub(crate) fn strong_password(password: &str) -> std::result::Result<(), ValidationError> {
    validate_password_strength(password).map_err(|message| {
        ValidationError::new("password").with_message(Cow::Owned(message))
    })
}

/// Input for creating a user
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct CreateUser {
    #[validate(length(min = 1, max = 200, message = "name is required"))]
    pub name: String,

    #[validate(email(message = "email is not valid"))]
    pub email: String,

    #[validate(custom(function = "strong_password"))]
    pub password: String,

    #[validate(must_match(other = "password", message = "passwords do not match"))]
    pub password_confirm: String,

    /// Defaults to `America/Anchorage`
    #[validate(length(min = 1, max = 64, message = "timezone is not valid"))]
    #[serde(default)]
    pub timezone: Option<String>,
}

impl std::fmt::Debug for CreateUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateUser")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("timezone", &self.timezone)
            .finish_non_exhaustive()
    }
}

/// Partial update of a user; `None` fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateUser {
    #[validate(length(min = 1, max = 200, message = "name is required"))]
    pub name: Option<String>,

    #[validate(email(message = "email is not valid"))]
    pub email: Option<String>,

    #[validate(length(min = 1, max = 64, message = "timezone is not valid"))]
    pub timezone: Option<String>,
}

/// A fresh per-user salt and the Argon2 hash of a password under it
#[derive(Clone)]
pub(crate) struct HashedPassword {
    pub salt: String,
    pub hash: String,
}

impl HashedPassword {
    pub(crate) async fn new(password: String) -> Result<Self> {
        let salt = password::generate_salt();
        let hash = password::hash_password_blocking(password, salt.clone()).await?;
        Ok(Self { salt, hash })
    }
}

impl User {
    pub async fn find<'c, A>(db: A, claims: &Claims, request: &FindRequest) -> Result<Vec<Self>>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        query::find(db, claims, request, "users.find").await
    }

    pub async fn read<'c, A>(db: A, claims: &Claims, id: Uuid, include_archived: bool) -> Result<Self>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        query::read(db, claims, id, include_archived, "users.read").await
    }

    /// Live user with `email`, compared case-insensitively
    ///
    /// Internal lookup: no ACL predicate is applied.
    pub async fn find_by_email<'c, A>(db: A, email: &str) -> Result<Option<Self>>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        let request = FindRequest::new().filter("email", normalize_email(email)).limit(1);
        let users: Vec<Self> = query::find(db, &Claims::internal(), &request, "users.find_by_email").await?;
        Ok(users.into_iter().next())
    }

    /// Live user holding the reset `token`
    pub async fn find_by_reset_token<'c, A>(db: A, token: &str) -> Result<Option<Self>>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        let mut conn = db.acquire().await.map_err(db_err("users.find_by_reset_token"))?;
        let sql = "SELECT id, name, email, password_salt, password_hash, password_reset, timezone, \
                   created_at, updated_at, archived_at FROM users \
                   WHERE password_reset = $1 AND archived_at IS NULL";

        sqlx::query_as::<_, User>(sql)
            .bind(token)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_err("users.find_by_reset_token"))
    }

    /// Fails with an `email` validation error if a live user already uses `email`
    pub async fn unique_email<'c, A>(db: A, email: &str, exclude_id: Option<Uuid>) -> Result<()>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        let mut conn = db.acquire().await.map_err(db_err("users.unique_email"))?;

        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1 AND archived_at IS NULL \
             AND ($2::uuid IS NULL OR id <> $2))",
        )
        .bind(normalize_email(email))
        .bind(exclude_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err("users.unique_email"))?;

        if taken {
            Err(Error::field("email", "email is already taken"))
        } else {
            Ok(())
        }
    }

    /// Creates a user with a freshly salted password hash
    ///
    /// Outside of internal calls this requires the admin role. The new user
    /// has no memberships until one is added.
    pub async fn create<'c, A>(
        db: A,
        claims: &Claims,
        data: CreateUser,
        now: DateTime<Utc>,
    ) -> Result<Self>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        validate(&data)?;
        acl::require_user_admin(claims)?;

        let mut conn = db.acquire().await.map_err(db_err("users.create"))?;
        Self::unique_email(&mut *conn, &data.email, None).await?;

        let password = HashedPassword::new(data.password.clone()).await?;
        Self::insert(&mut *conn, &data, &password, now).await
    }

    /// Inserts an already validated user with a precomputed password hash
    ///
    /// No role gate and no uniqueness pre-check; the unique index still
    /// applies.
    pub(crate) async fn insert(
        conn: &mut PgConnection,
        data: &CreateUser,
        password: &HashedPassword,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let now = truncate_ms(now);

        let sql = format!(
            "INSERT INTO users (id, name, email, password_salt, password_hash, timezone, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7){}",
            RETURNING
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&data.name)
            .bind(normalize_email(&data.email))
            .bind(&password.salt)
            .bind(&password.hash)
            .bind(data.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE))
            .bind(now)
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err("users.create"))?;

        tracing::info!(user_id = %user.id, "User created");
        Ok(user)
    }

    /// Partial update; the caller themself or an admin
    pub async fn update<'c, A>(
        db: A,
        claims: &Claims,
        id: Uuid,
        data: UpdateUser,
        now: DateTime<Utc>,
    ) -> Result<Self>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        validate(&data)?;
        let now = truncate_ms(now);

        let mut conn = db.acquire().await.map_err(db_err("users.update"))?;

        Self::read(&mut *conn, claims, id, false).await?;
        acl::require_self_or_admin(claims, id)?;

        let email = data.email.as_deref().map(normalize_email);
        if let Some(email) = &email {
            Self::unique_email(&mut *conn, email, Some(id)).await?;
        }

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE users SET updated_at = ");
        qb.push_bind(now);
        for (column, value) in [("name", data.name), ("email", email), ("timezone", data.timezone)] {
            if let Some(value) = value {
                qb.push(", ").push(column).push(" = ").push_bind(value);
            }
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(RETURNING);

        qb.build_query_as::<User>()
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err("users.update"))
    }

    /// Stores a new salt and hash and clears any reset token
    ///
    /// No access checks; callers in `auth::flow` perform them.
    pub(crate) async fn store_password(
        conn: &mut PgConnection,
        id: Uuid,
        salt: &str,
        hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let sql = format!(
            "UPDATE users SET password_salt = $2, password_hash = $3, password_reset = NULL, \
             updated_at = $4 WHERE id = $1{}",
            RETURNING
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(salt)
            .bind(hash)
            .bind(truncate_ms(now))
            .fetch_one(conn)
            .await
            .map_err(db_err("users.store_password"))
    }

    /// Sets or clears the reset token; no access checks
    pub(crate) async fn store_reset_token(
        conn: &mut PgConnection,
        id: Uuid,
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE users SET password_reset = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(token)
            .bind(truncate_ms(now))
            .execute(conn)
            .await
            .map_err(db_err("users.store_reset_token"))?;
        Ok(())
    }

    /// Archives the user and their memberships in one transaction
    pub async fn archive<'c, A>(db: A, claims: &Claims, id: Uuid, now: DateTime<Utc>) -> Result<Self>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        let now = truncate_ms(now);
        let mut tx = db.begin().await.map_err(db_err("users.archive"))?;

        Self::read(&mut *tx, claims, id, false).await?;
        acl::require_user_admin(claims)?;

        let sql = format!(
            "UPDATE users SET archived_at = $2, updated_at = $2 WHERE id = $1{}",
            RETURNING
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err("users.archive"))?;

        sqlx::query(
            "UPDATE users_accounts SET archived_at = $2, updated_at = $2 \
             WHERE user_id = $1 AND archived_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_err("users.archive"))?;

        tx.commit().await.map_err(db_err("users.archive"))?;

        tracing::info!(user_id = %id, "User archived");
        Ok(user)
    }

    /// Deletes the user and their memberships in one transaction
    ///
    /// Fails with `Conflict` while an account still references the user as its
    /// signup or billing user.
    pub async fn delete<'c, A>(db: A, claims: &Claims, id: Uuid) -> Result<()>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        let mut tx = db.begin().await.map_err(db_err("users.delete"))?;

        Self::read(&mut *tx, claims, id, true).await?;
        acl::require_user_admin(claims)?;

        for sql in [
            "DELETE FROM users_accounts WHERE user_id = $1",
            "DELETE FROM users WHERE id = $1",
        ] {
            sqlx::query(sql)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(db_err("users.delete"))?;
        }

        tx.commit().await.map_err(db_err("users.delete"))?;

        tracing::info!(user_id = %id, "User deleted");
        Ok(())
    }
}
