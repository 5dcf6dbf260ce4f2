/// Project model and database operations
///
/// Projects are the example of an account-scoped resource: visible to members
/// of the owning account and mutable by its admins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Acquire, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use crate::auth::acl::{self, Scope};
use crate::auth::claims::Claims;
use crate::db::query::{self, FindRequest, Record};
use crate::db::truncate_ms;
use crate::error::{db_err, Error, Result};
use crate::models::account::Account;
use crate::validation::validate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "project_status_t", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Active,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl Record for Project {
    const TABLE: &'static str = "projects";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "account_id",
        "name",
        "status",
        "created_at",
        "updated_at",
        "archived_at",
    ];
    const SCOPE: Scope = Scope::AccountResource;
}

const RETURNING: &str = " RETURNING id, account_id, name, status, created_at, updated_at, archived_at";

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CreateProject {
    /// Defaults to the caller's audience
    #[serde(default)]
    pub account_id: Option<Uuid>,

    #[validate(length(min = 1, max = 200, message = "name is required"))]
    pub name: String,

    #[serde(default)]
    pub status: Option<ProjectStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateProject {
    #[validate(length(min = 1, max = 200, message = "name is required"))]
    pub name: Option<String>,
    pub status: Option<ProjectStatus>,
}

impl Project {
    pub async fn find<'c, A>(db: A, claims: &Claims, request: &FindRequest) -> Result<Vec<Self>>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        query::find(db, claims, request, "projects.find").await
    }

    pub async fn read<'c, A>(db: A, claims: &Claims, id: Uuid, include_archived: bool) -> Result<Self>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        query::read(db, claims, id, include_archived, "projects.read").await
    }

    /// Live projects of `account_id`, oldest first
    pub async fn for_account<'c, A>(db: A, claims: &Claims, account_id: Uuid) -> Result<Vec<Self>>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        let request = FindRequest::new().filter("account_id", account_id);
        query::find(db, claims, &request, "projects.for_account").await
    }

    pub async fn create<'c, A>(
        db: A,
        claims: &Claims,
        data: CreateProject,
        now: DateTime<Utc>,
    ) -> Result<Self>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        validate(&data)?;
        let now = truncate_ms(now);

        let account_id = match data.account_id {
            Some(id) => id,
            None if !claims.is_internal() => claims.audience,
            None => return Err(Error::field("account_id", "account_id is required")),
        };

        let mut conn = db.acquire().await.map_err(db_err("projects.create"))?;

        Account::read(&mut *conn, claims, account_id, false).await?;
        acl::require_admin(claims, account_id)?;

        let sql = format!(
            "INSERT INTO projects (id, account_id, name, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5){}",
            RETURNING
        );
        let project = sqlx::query_as::<_, Project>(&sql)
            .bind(Uuid::new_v4())
            .bind(account_id)
            .bind(&data.name)
            .bind(data.status.unwrap_or_default())
            .bind(now)
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err("projects.create"))?;

        tracing::info!(project_id = %project.id, account_id = %account_id, "Project created");
        Ok(project)
    }

    pub async fn update<'c, A>(
        db: A,
        claims: &Claims,
        id: Uuid,
        data: UpdateProject,
        now: DateTime<Utc>,
    ) -> Result<Self>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        validate(&data)?;
        let now = truncate_ms(now);

        let mut conn = db.acquire().await.map_err(db_err("projects.update"))?;

        let current = Self::read(&mut *conn, claims, id, false).await?;
        acl::require_admin(claims, current.account_id)?;

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE projects SET updated_at = ");
        qb.push_bind(now);
        if let Some(name) = data.name {
            qb.push(", name = ").push_bind(name);
        }
        if let Some(status) = data.status {
            qb.push(", status = ").push_bind(status);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(RETURNING);

        qb.build_query_as::<Project>()
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err("projects.update"))
    }

    pub async fn archive<'c, A>(db: A, claims: &Claims, id: Uuid, now: DateTime<Utc>) -> Result<Self>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        let now = truncate_ms(now);
        let mut conn = db.acquire().await.map_err(db_err("projects.archive"))?;

        let current = Self::read(&mut *conn, claims, id, false).await?;
        acl::require_admin(claims, current.account_id)?;

        let sql = format!(
            "UPDATE projects SET archived_at = $2, updated_at = $2 WHERE id = $1{}",
            RETURNING
        );
        sqlx::query_as::<_, Project>(&sql)
            .bind(id)
            .bind(now)
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err("projects.archive"))
    }

    pub async fn delete<'c, A>(db: A, claims: &Claims, id: Uuid) -> Result<()>
    where
        A: Acquire<'c, Database = Postgres>,
    {
        let mut conn = db.acquire().await.map_err(db_err("projects.delete"))?;

        let current = Self::read(&mut *conn, claims, id, true).await?;
        acl::require_admin(claims, current.account_id)?;

        sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(db_err("projects.delete"))?;

        tracing::info!(project_id = %id, "Project deleted");
        Ok(())
    }
}
