/// The claims-scoped `SELECT` builder
///
/// Every repository `find` and `read` goes through [`select`]. The statement is
/// built in a fixed order:
///
/// 1. `SELECT <columns> FROM <table> WHERE TRUE`
/// 2. `AND <table>.archived_at IS NULL` unless archived rows were requested
/// 3. the caller's conditions, ANDed in the order given
/// 4. the ACL predicate for the claims
/// 5. `ORDER BY` (default `created_at`), then `LIMIT` / `OFFSET`
///
/// Column names never come from bind values, so every caller-supplied column
/// is checked against the entity's whitelist first.
///
/// # Example
///
/// ```no_run
/// use launchpad_shared::auth::claims::Claims;
/// use launchpad_shared::db::query::FindRequest;
/// use launchpad_shared::models::project::Project;
///
/// # async fn example(pool: sqlx::PgPool, claims: Claims) -> launchpad_shared::Result<()> {
/// let request = FindRequest::new()
///     .filter("name", "Frontier")
///     .order_by("name", false)
///     .limit(20);
///
/// let projects = Project::find(&pool, &claims, &request).await?;
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, Acquire, FromRow, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::auth::acl::{self, Scope};
use crate::auth::claims::Claims;
use crate::error::{db_err, Error, Result};

/// A row type the builder can select
pub trait Record: for<'r> FromRow<'r, PgRow> + Send + Unpin {
    const TABLE: &'static str;

    /// Selected columns; all of them are filterable and sortable except `PRIVATE`
    const COLUMNS: &'static [&'static str];

    /// Columns callers may never filter or sort on
    const PRIVATE: &'static [&'static str] = &[];

    const SCOPE: Scope;
}

/// Right-hand side of a condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Uuid(Uuid),
    /// Compared against the column's text form, which also covers enum columns
    Text(String),
    Null,
}

impl From<Uuid> for FilterValue {
    fn from(value: Uuid) -> Self {
        FilterValue::Uuid(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

/// `column = value` or `column IS NULL`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    pub value: FilterValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    #[serde(default)]
    pub descending: bool,
}

/// Parameters of a `find` call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindRequest {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub order: Vec<OrderBy>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(default)]
    pub include_archived: bool,
}

impl FindRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.conditions.push(Condition {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    pub fn is_null(mut self, column: impl Into<String>) -> Self {
        self.conditions.push(Condition {
            column: column.into(),
            value: FilterValue::Null,
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, descending: bool) -> Self {
        self.order.push(OrderBy {
            column: column.into(),
            descending,
        });
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn include_archived(mut self, include: bool) -> Self {
        self.include_archived = include;
        self
    }
}

fn check_column<R: Record>(column: &str, field: &str) -> Result<()> {
    if R::COLUMNS.contains(&column) && !R::PRIVATE.contains(&column) {
        Ok(())
    } else {
        Err(Error::field(field, format!("unknown column {}", column)))
    }
}

/// Builds the scoped `SELECT` for `request`
///
/// # Errors
///
/// Returns `Error::Validation` for unknown columns or a negative limit/offset.
pub fn select<R: Record>(claims: &Claims, request: &FindRequest) -> Result<QueryBuilder<'static, Postgres>> {
    let table = R::TABLE;
    let columns = R::COLUMNS
        .iter()
        .map(|c| format!("{}.{}", table, c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut qb = QueryBuilder::new("SELECT ");
    qb.push(columns).push(" FROM ").push(table).push(" WHERE TRUE");

    if !request.include_archived {
        qb.push(" AND ").push(table).push(".archived_at IS NULL");
    }

    for condition in &request.conditions {
        check_column::<R>(&condition.column, "conditions")?;
        qb.push(" AND ").push(table).push(".").push(&condition.column);
        match &condition.value {
            FilterValue::Uuid(value) => {
                qb.push(" = ").push_bind(*value);
            }
            FilterValue::Text(value) => {
                qb.push("::text = ").push_bind(value.clone());
            }
            FilterValue::Null => {
                qb.push(" IS NULL");
            }
        }
    }

    acl::push_read_predicate(&mut qb, claims, R::SCOPE, table);

    qb.push(" ORDER BY ");
    if request.order.is_empty() {
        qb.push(table).push(".created_at");
    } else {
        for (i, order) in request.order.iter().enumerate() {
            check_column::<R>(&order.column, "order")?;
            if i > 0 {
                qb.push(", ");
            }
            qb.push(table).push(".").push(&order.column);
            qb.push(if order.descending { " DESC" } else { " ASC" });
        }
    }

    if let Some(limit) = request.limit {
        if limit < 0 {
            return Err(Error::field("limit", "limit must not be negative"));
        }
        qb.push(" LIMIT ").push_bind(limit);
    }
    if let Some(offset) = request.offset {
        if offset < 0 {
            return Err(Error::field("offset", "offset must not be negative"));
        }
        qb.push(" OFFSET ").push_bind(offset);
    }

    Ok(qb)
}

/// Runs [`select`] and materializes every row
pub async fn find<'c, R, A>(
    db: A,
    claims: &Claims,
    request: &FindRequest,
    operation: &'static str,
) -> Result<Vec<R>>
where
    R: Record,
    A: Acquire<'c, Database = Postgres>,
{
    let mut qb = select::<R>(claims, request)?;
    let mut conn = db.acquire().await.map_err(db_err(operation))?;

    qb.build_query_as::<R>()
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err(operation))
}

/// Fetches exactly one row by id, or `NotFound`
pub async fn read<'c, R, A>(
    db: A,
    claims: &Claims,
    id: Uuid,
    include_archived: bool,
    operation: &'static str,
) -> Result<R>
where
    R: Record,
    A: Acquire<'c, Database = Postgres>,
{
    let request = FindRequest::new().filter("id", id).include_archived(include_archived);
    let mut qb = select::<R>(claims, &request)?;
    let mut conn = db.acquire().await.map_err(db_err(operation))?;

    qb.build_query_as::<R>()
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err(operation))?
        .ok_or(Error::NotFound)
}
