/// Error taxonomy for the Launchpad core
///
/// Every public operation in this crate returns [`Error`]. No other error type
/// leaks from the core's surface: store, password, token, and key errors are
/// classified into one of the kinds below before they are returned.
///
/// # Kinds
///
/// | Kind                    | Trigger                                                  |
/// |-------------------------|----------------------------------------------------------|
/// | `NotFound`              | Row missing, or hidden by the caller's ACL predicate     |
/// | `InvalidId`             | Identifier is not a well-formed UUID                     |
/// | `Forbidden`             | Claims failed a role gate                                |
/// | `AuthenticationFailure` | Password or token check failed; switch to a non-member   |
/// | `Validation`            | Structural validation or a uniqueness check failed       |
/// | `Conflict`              | Foreign-key violation surfaced by the store              |
/// | `Cancelled`             | The caller cancelled the operation                       |
/// | `Internal`              | Anything the caller cannot remedy                        |
///
/// A row that exists but is excluded by the ACL predicate is always
/// `NotFound`, never `Forbidden`.

use serde::{Deserialize, Serialize};

/// Result alias used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A single failed field in a validation error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field name, dotted for nested requests (e.g. `user.email`)
    pub name: String,

    /// Human-readable message
    pub message: String,
}

impl FieldError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Core error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Target row is missing or hidden by the ACL predicate
    #[error("Resource not found")]
    NotFound,

    /// Identifier is not well-formed
    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    /// Claims failed the role gate
    #[error("Forbidden")]
    Forbidden,

    /// Credentials or token rejected
    #[error("Authentication failed")]
    AuthenticationFailure,

    /// One or more fields failed validation
    #[error("Validation failed: {} errors", .0.len())]
    Validation(Vec<FieldError>),

    /// Foreign-key violation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The operation was cancelled before it completed
    #[error("Operation cancelled")]
    Cancelled,

    /// Store or transport failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Builds a validation error for a single field
    pub fn field(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation(vec![FieldError::new(name, message)])
    }

    /// Stable machine-readable kind, used in response bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound => "not_found",
            Error::InvalidId(_) => "invalid_id",
            Error::Forbidden => "forbidden",
            Error::AuthenticationFailure => "authentication_failure",
            Error::Validation(_) => "validation_error",
            Error::Conflict(_) => "conflict",
            Error::Cancelled => "cancelled",
            Error::Internal(_) => "internal",
        }
    }

    /// Classifies a store error raised while running `operation`
    ///
    /// - `23505` (unique violation) → `Validation` on the field behind the index
    /// - `23514` (check violation) → `Validation` on the constrained field
    /// - `23503` (foreign-key violation) → `Conflict`
    /// - `RowNotFound` → `NotFound`
    /// - everything else → `Internal`
    pub fn from_store(operation: &'static str, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound,
            sqlx::Error::Database(db_err) => {
                let constraint = db_err.constraint().unwrap_or_default().to_string();
                match db_err.code().as_deref() {
                    Some("23505") => {
                        tracing::debug!(operation, constraint = %constraint, "Unique violation");
                        let field = constraint_field(&constraint);
                        Error::field(field, format!("{} is already taken", field))
                    }
                    Some("23514") => {
                        tracing::debug!(operation, constraint = %constraint, "Check violation");
                        let field = constraint_field(&constraint);
                        Error::field(field, format!("{} is not valid", field))
                    }
                    Some("23503") => {
                        tracing::warn!(operation, constraint = %constraint, "Foreign key violation");
                        Error::Conflict(format!("{} is still referenced", constraint))
                    }
                    _ => {
                        tracing::error!(operation, error = %db_err, "Database error");
                        Error::Internal(format!("Database error in {}", operation))
                    }
                }
            }
            other => {
                tracing::error!(operation, error = %other, "Store error");
                Error::Internal(format!("Store error in {}", operation))
            }
        }
    }
}

/// Returns a closure that classifies a store error for `operation`
///
/// ```ignore
/// sqlx::query("...").execute(&mut *conn).await.map_err(db_err("users.archive"))?;
/// ```
pub(crate) fn db_err(operation: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
    move |err| Error::from_store(operation, err)
}

/// Maps a constraint or index name to the request field it guards
fn constraint_field(constraint: &str) -> &'static str {
    match constraint {
        "users_email_unique" => "email",
        "accounts_name_unique" => "name",
        "users_accounts_pair_unique" => "account_id",
        "users_accounts_roles_check" => "roles",
        c if c.ends_with("_timestamps_check") => "updated_at",
        c if c.ends_with("_archived_check") => "archived_at",
        _ => "id",
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Error::Validation(crate::validation::field_errors(&errors, None))
    }
}

impl From<crate::auth::password::PasswordError> for Error {
    fn from(err: crate::auth::password::PasswordError) -> Self {
        tracing::error!(error = %err, "Password operation failed");
        Error::Internal("Password operation failed".to_string())
    }
}

impl From<crate::auth::jwt::JwtError> for Error {
    fn from(err: crate::auth::jwt::JwtError) -> Self {
        match err {
            crate::auth::jwt::JwtError::InvalidToken(reason) => {
                tracing::debug!(reason = %reason, "Token rejected");
                Error::AuthenticationFailure
            }
            crate::auth::jwt::JwtError::CreateError(reason) => {
                tracing::error!(reason = %reason, "Token issue failed");
                Error::Internal("Token issue failed".to_string())
            }
        }
    }
}

impl From<crate::auth::keystore::KeyStoreError> for Error {
    fn from(err: crate::auth::keystore::KeyStoreError) -> Self {
        tracing::error!(error = %err, "Key store failure");
        Error::Internal("Key store failure".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(Error::NotFound.to_string(), "Resource not found");
        assert_eq!(
            Error::Validation(vec![
                FieldError::new("email", "taken"),
                FieldError::new("name", "required"),
            ])
            .to_string(),
            "Validation failed: 2 errors"
        );
    }

    #[test]
    fn test_error_kinds_are_distinct() {
        let kinds = [
            Error::NotFound.kind(),
            Error::InvalidId("x".into()).kind(),
            Error::Forbidden.kind(),
            Error::AuthenticationFailure.kind(),
            Error::Validation(vec![]).kind(),
            Error::Conflict("x".into()).kind(),
            Error::Cancelled.kind(),
            Error::Internal("x".into()).kind(),
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }

    #[test]
    fn test_row_not_found_is_not_found() {
        let err = Error::from_store("users.read", sqlx::Error::RowNotFound);
        assert!(matches!(err, Error::NotFound));
    }

    #[test]
    fn test_pool_errors_are_internal() {
        let err = Error::from_store("users.read", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn test_constraint_field_mapping() {
        assert_eq!(constraint_field("users_email_unique"), "email");
        assert_eq!(constraint_field("accounts_name_unique"), "name");
        assert_eq!(constraint_field("users_accounts_pair_unique"), "account_id");
        assert_eq!(constraint_field("projects_timestamps_check"), "updated_at");
        assert_eq!(constraint_field("users_archived_check"), "archived_at");
        assert_eq!(constraint_field("something_else"), "id");
    }

    #[test]
    fn test_field_helper() {
        match Error::field("email", "email is already taken") {
            Error::Validation(fields) => {
                assert_eq!(fields, vec![FieldError::new("email", "email is already taken")]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
