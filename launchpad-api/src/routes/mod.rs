/// API route handlers, one module per resource
///
/// - `health`: Liveness and database connectivity
/// - `auth`: Signup, token issue, account switching
/// - `users`, `accounts`, `memberships`, `projects`: Claims-scoped CRUD

pub mod accounts;
pub mod auth;
pub mod health;
pub mod memberships;
pub mod projects;
pub mod users;

use launchpad_shared::db::query::FindRequest;
use launchpad_shared::validation::normalize_email;
use serde::Deserialize;
use uuid::Uuid;

/// Query string of every list endpoint
///
/// Filters that do not apply to the listed resource are rejected by the query
/// builder as unknown columns.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(default)]
    pub include_archived: bool,
    pub order_by: Option<String>,
    #[serde(default)]
    pub descending: bool,

    pub account_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub status: Option<String>,
}

impl ListParams {
    pub fn into_request(self) -> FindRequest {
        let mut request = FindRequest::new().include_archived(self.include_archived);

        for (column, value) in [("account_id", self.account_id), ("user_id", self.user_id)] {
            if let Some(value) = value {
                request = request.filter(column, value);
            }
        }
        let email = self.email.as_deref().map(normalize_email);
        for (column, value) in [("name", self.name), ("email", email), ("status", self.status)] {
            if let Some(value) = value {
                request = request.filter(column, value);
            }
        }
        if let Some(column) = self.order_by {
            request = request.order_by(column, self.descending);
        }
        if let Some(limit) = self.limit {
            request = request.limit(limit);
        }
        if let Some(offset) = self.offset {
            request = request.offset(offset);
        }
        request
    }
}
