/// Authentication endpoints
///
/// - `POST /v1/signup`: Create an account, its first user, and their admin membership
/// - `POST /v1/oauth/token`: Exchange HTTP Basic `email:password` for a bearer token
/// - `PATCH /v1/users/switch-account/:account_id`: Re-issue the token for another account

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    Extension, Json,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use launchpad_shared::{
    auth::{claims::Claims, flow},
    signup::{self as signup_flow, SignupRequest, SignupResult},
    validation::parse_id,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<flow::TokenGrant> for TokenResponse {
    fn from(grant: flow::TokenGrant) -> Self {
        Self {
            token: grant.token,
            expires_at: grant.claims.expires_at,
        }
    }
}

/// Self-service signup
///
/// ```text
/// POST /v1/signup
///
/// {
///   "account": { "name": "Frontier" },
///   "user": { "name": "Lee", "email": "lee@frontier.test",
///             "password": "...", "password_confirm": "..." }
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Field errors, named `account.*` and `user.*`
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<(StatusCode, Json<SignupResult>)> {
    let result = signup_flow::signup(&state.db, req, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// Decodes `Basic base64(email:password)`
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (email, password) = decoded.split_once(':')?;
    Some((email.to_string(), password.to_string()))
}

/// Issues a bearer token
///
/// ```text
/// POST /v1/oauth/token
/// Authorization: Basic base64(email:password)
/// ```
///
/// # Errors
///
/// - `401 Unauthorized`: Missing or malformed credentials, or sign-in failed
pub async fn token(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<TokenResponse>> {
    let (email, password) = basic_credentials(&headers)
        .ok_or_else(|| ApiError::Unauthorized("Missing basic credentials".to_string()))?;

    let grant = flow::authenticate(
        &state.db,
        &state.authenticator,
        &email,
        &password,
        state.config.session.ttl(),
        Utc::now(),
    )
    .await?;

    Ok(Json(grant.into()))
}

/// Re-issues the caller's token bound to another of their accounts
///
/// # Errors
///
/// - `400 Bad Request`: `account_id` is not a UUID
/// - `401 Unauthorized`: The caller is not a live member of the account
pub async fn switch_account(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(account_id): Path<String>,
) -> ApiResult<Json<TokenResponse>> {
    let account_id = parse_id(&account_id)?;

    let grant = flow::switch_account(
        &state.db,
        &state.authenticator,
        &claims,
        account_id,
        state.config.session.ttl(),
        Utc::now(),
    )
    .await?;

    Ok(Json(grant.into()))
}
