/// Account model and database operations
///
/// Accounts are the tenant boundary. Users reach an account through a
/// membership; projects hang off an account.
///
/// Archiving an account archives its memberships in the same transaction.
/// Deleting an account removes its memberships and projects first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Acquire, PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use crate::auth::acl::{self, Scope};
use crate::auth::claims::Claims;
use crate::db::query::{self, FindRequest, Record};
use crate::db::truncate_ms;
use crate::error::{db_err, Error, Result};
use crate::models::membership::{AddMembership, Membership, Role};
use crate::models::DEFAULT_TIMEZONE;
use crate::validation::validate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "account_status_t", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    Active,
    Pending,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: Uuid,

    /// Unique across non-archived accounts
    pub name: String,

    pub address1: String,
    pub address2: String,
    pub city: String,
    pub region: String,
    pub country: String,
    pub zipcode: String,
    pub timezone: String,
    pub status: AccountStatus,

    /// User who created the account through signup
    pub signup_user_id: Option<Uuid>,
    pub billing_user_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl Record for Account {
    const TABLE: &'static str = "accounts";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "address1",
        "address2",
        "city",
        "region",
        "country",
        "zipcode",
        "timezone",
        "status",
        "signup_user_id",
        "billing_user_id",
        "created_at",
        "updated_at",
        "archived_at",
    ];
    const SCOPE: Scope = Scope::Account;
}

const RETURNING: &str = " RETURNING id, name, address1, address2, city, region, country, zipcode, \
     timezone, status, signup_user_id, billing_user_id, created_at, updated_at, archived_at";

/// Input for creating an account
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CreateAccount {
    #[validate(length(min = 1, max = 200, message = "name is required"))]
    pub name: String,

    #[serde(default)]
    pub address1: String,
    #[serde(default)]
    pub address2: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub zipcode: String,

    /// Defaults to `America/Anchorage`
    #[validate(length(min = 1, max = 64, message = "timezone is not valid"))]
    pub timezone: Option<String>,

    /// Defaults to active
    pub status: Option<AccountStatus>,

    #[serde(default)]
    pub signup_user_id: Option<Uuid>,
    #[serde(default)]
    pub billing_user_id: Option<Uuid>,
}

/// Partial update of an account; `None` fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateAccount {
    #[validate(length(min = 1, max = 200, message = "name is required"))]
    pub name: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub zipcode: Option<String>,
    #[validate(length(min = 1, max = 64, message = "timezone is not valid"))]
    pub timezone: Option<String>,
    pub status: Option<AccountStatus>,
    pub billing_user_id: Option<Uuid>,
}

impl Account {
    pub async fn find<'c, A>(db: A, claims: &Claims, request: &FindRequest) -> Result<Vec<Self>>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        query::find(db, claims, request, "accounts.find").await
    }

    pub async fn read<'c, A>(db: A, claims: &Claims, id: Uuid, include_archived: bool) -> Result<Self>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        query::read(db, claims, id, include_archived, "accounts.read").await
    }

    /// Fails with a `name` validation error if a live account already uses `name`
    pub async fn unique_name<'c, A>(db: A, name: &str, exclude_id: Option<Uuid>) -> Result<()>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        let mut conn = db.acquire().await.map_err(db_err("accounts.unique_name"))?;

        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM accounts WHERE name = $1 AND archived_at IS NULL \
             AND ($2::uuid IS NULL OR id <> $2))",
        )
        .bind(name)
        .bind(exclude_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err("accounts.unique_name"))?;

        if taken {
            Err(Error::field("name", "name is already taken"))
        } else {
            Ok(())
        }
    }

    /// Fails with a `billing_user_id` validation error unless `user_id` has a
    /// live membership in `account_id`
    async fn require_billing_member(conn: &mut PgConnection, account_id: Uuid, user_id: Uuid) -> Result<()> {
        let membership =
            Membership::find_pair(&mut *conn, &Claims::internal(), user_id, account_id, false).await?;
        if membership.is_some() {
            Ok(())
        } else {
            Err(Error::field("billing_user_id", "billing user must be a member of the account"))
        }
    }

    /// Creates an account
    ///
    /// Outside of internal calls this requires the admin role in the caller's
    /// audience, and the caller becomes the new account's admin in the same
    /// transaction. `signup_user_id` is only honoured for internal calls; the
    /// billing user of a caller-created account can only be the caller.
    pub async fn create<'c, A>(
        db: A,
        claims: &Claims,
        mut data: CreateAccount,
        now: DateTime<Utc>,
    ) -> Result<Self>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        validate(&data)?;
        acl::require_user_admin(claims)?;
        if !claims.is_internal() {
            data.signup_user_id = None;
            if data.billing_user_id.is_some_and(|id| id != claims.subject) {
                return Err(Error::field(
                    "billing_user_id",
                    "billing user must be a member of the account",
                ));
            }
        }
        let now = truncate_ms(now);

        let mut tx = db.begin().await.map_err(db_err("accounts.create"))?;

        Self::unique_name(&mut *tx, &data.name, None).await?;

        let sql = format!(
            "INSERT INTO accounts (id, name, address1, address2, city, region, country, zipcode, \
             timezone, status, signup_user_id, billing_user_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13){}",
            RETURNING
        );
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(Uuid::new_v4())
            .bind(&data.name)
            .bind(&data.address1)
            .bind(&data.address2)
            .bind(&data.city)
            .bind(&data.region)
            .bind(&data.country)
            .bind(&data.zipcode)
            .bind(data.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE))
            .bind(data.status.unwrap_or_default())
            .bind(data.signup_user_id)
            .bind(data.billing_user_id)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err("accounts.create"))?;

        if !claims.is_internal() {
            Membership::add(
                &mut *tx,
                &Claims::internal(),
                AddMembership {
                    user_id: claims.subject,
                    account_id: account.id,
                    roles: vec![Role::Admin],
                    status: None,
                },
                now,
            )
            .await?;
        }

        tx.commit().await.map_err(db_err("accounts.create"))?;

        tracing::info!(account_id = %account.id, name = %account.name, "Account created");
        Ok(account)
    }

    pub async fn update<'c, A>(
        db: A,
        claims: &Claims,
        id: Uuid,
        data: UpdateAccount,
        now: DateTime<Utc>,
    ) -> Result<Self>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        validate(&data)?;
        let now = truncate_ms(now);

        let mut conn = db.acquire().await.map_err(db_err("accounts.update"))?;

        Self::read(&mut *conn, claims, id, false).await?;
        acl::require_admin(claims, id)?;

        if let Some(name) = &data.name {
            Self::unique_name(&mut *conn, name, Some(id)).await?;
        }
        if let Some(billing_user_id) = data.billing_user_id {
            Self::require_billing_member(&mut *conn, id, billing_user_id).await?;
        }

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE accounts SET updated_at = ");
        qb.push_bind(now);

        let text_fields = [
            ("name", data.name),
            ("address1", data.address1),
            ("address2", data.address2),
            ("city", data.city),
            ("region", data.region),
            ("country", data.country),
            ("zipcode", data.zipcode),
            ("timezone", data.timezone),
        ];
        for (column, value) in text_fields {
            if let Some(value) = value {
                qb.push(", ").push(column).push(" = ").push_bind(value);
            }
        }
        if let Some(status) = data.status {
            qb.push(", status = ").push_bind(status);
        }
        if let Some(billing_user_id) = data.billing_user_id {
            qb.push(", billing_user_id = ").push_bind(billing_user_id);
        }

        qb.push(" WHERE id = ").push_bind(id);
        qb.push(RETURNING);

        qb.build_query_as::<Account>()
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err("accounts.update"))
    }

    /// Archives the account and all of its memberships in one transaction
    pub async fn archive<'c, A>(db: A, claims: &Claims, id: Uuid, now: DateTime<Utc>) -> Result<Self>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        let now = truncate_ms(now);
        let mut tx = db.begin().await.map_err(db_err("accounts.archive"))?;

        Self::read(&mut *tx, claims, id, false).await?;
        acl::require_admin(claims, id)?;

        let sql = format!(
            "UPDATE accounts SET archived_at = $2, updated_at = $2 WHERE id = $1{}",
            RETURNING
        );
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err("accounts.archive"))?;

        let archived = sqlx::query(
            "UPDATE users_accounts SET archived_at = $2, updated_at = $2 \
             WHERE account_id = $1 AND archived_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_err("accounts.archive"))?;

        tx.commit().await.map_err(db_err("accounts.archive"))?;

        tracing::info!(
            account_id = %id,
            memberships = archived.rows_affected(),
            "Account archived"
        );
        Ok(account)
    }

    /// Deletes the account, its memberships, and its projects in one transaction
    pub async fn delete<'c, A>(db: A, claims: &Claims, id: Uuid) -> Result<()>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        let mut tx = db.begin().await.map_err(db_err("accounts.delete"))?;

        Self::read(&mut *tx, claims, id, true).await?;
        acl::require_admin(claims, id)?;

        for sql in [
            "DELETE FROM users_accounts WHERE account_id = $1",
            "DELETE FROM projects WHERE account_id = $1",
            "DELETE FROM accounts WHERE id = $1",
        ] {
            sqlx::query(sql)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(db_err("accounts.delete"))?;
        }

        tx.commit().await.map_err(db_err("accounts.delete"))?;

        tracing::info!(account_id = %id, "Account deleted");
        Ok(())
    }
}
