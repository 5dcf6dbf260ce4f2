/// HTTP mapping of core errors
///
/// Handlers return `ApiResult<T>`. Core errors convert through `From`, so `?`
/// on any repository or auth-flow call produces the right status and body.
///
/// # Response Body
///
/// ```json
/// {
///   "error": "validation_error",
///   "message": "Request validation failed",
///   "fields": [{ "name": "user.email", "message": "email is already taken" }]
/// }
/// ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use launchpad_shared::{Error, FieldError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// 400
    BadRequest(String),

    /// 401
    Unauthorized(String),

    /// 403
    Forbidden(String),

    /// 404
    NotFound(String),

    /// 409
    Conflict(String),

    /// 400 with per-field details
    ValidationError(Vec<FieldError>),

    /// 500; the message is logged, never returned
    InternalError(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fields: Option<Vec<FieldError>>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::ValidationError(fields) => write!(f, "Validation failed: {} errors", fields.len()),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (error_code, message, fields) = match self {
            ApiError::BadRequest(msg) => ("bad_request", msg, None),
            ApiError::Unauthorized(msg) => ("unauthorized", msg, None),
            ApiError::Forbidden(msg) => ("forbidden", msg, None),
            ApiError::NotFound(msg) => ("not_found", msg, None),
            ApiError::Conflict(msg) => ("conflict", msg, None),
            ApiError::ValidationError(fields) => (
                "validation_error",
                "Request validation failed".to_string(),
                Some(fields),
            ),
            ApiError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                ("internal_error", "An internal error occurred".to_string(), None)
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            fields,
        });

        (status, body).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound => ApiError::NotFound("Resource not found".to_string()),
            Error::InvalidId(raw) => ApiError::BadRequest(format!("Invalid identifier: {}", raw)),
            Error::Forbidden => ApiError::Forbidden("Insufficient permissions".to_string()),
            Error::AuthenticationFailure => ApiError::Unauthorized("Authentication failed".to_string()),
            Error::Validation(fields) => ApiError::ValidationError(fields),
            Error::Conflict(msg) => ApiError::Conflict(msg),
            Error::Cancelled => ApiError::InternalError("Operation cancelled".to_string()),
            Error::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}
