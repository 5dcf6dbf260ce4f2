/// User endpoints
///
/// Every handler runs with the caller's claims, so a user outside the caller's
/// accounts is `404`, and a visible user the caller may not change is `403`.

use crate::{app::AppState, error::ApiResult, routes::ListParams};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use launchpad_shared::{
    auth::{
        claims::Claims,
        flow::{self, PasswordChange},
    },
    models::user::{CreateUser, UpdateUser, User},
    validation::parse_id,
};

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<User>>> {
    let users = User::find(&state.db, &claims, &params.into_request()).await?;
    Ok(Json(users))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateUser>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user = User::create(&state.db, &claims, req, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> ApiResult<Json<User>> {
    let user = User::read(&state.db, &claims, parse_id(&id)?, false).await?;
    Ok(Json(user))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<UpdateUser>,
) -> ApiResult<Json<User>> {
    let user = User::update(&state.db, &claims, parse_id(&id)?, req, Utc::now()).await?;
    Ok(Json(user))
}

/// `PATCH /v1/users/:id/password` with `{password, password_confirm}`
pub async fn update_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<PasswordChange>,
) -> ApiResult<Json<User>> {
    let user = flow::update_password(&state.db, &claims, parse_id(&id)?, req, Utc::now()).await?;
    Ok(Json(user))
}

pub async fn archive(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> ApiResult<Json<User>> {
    let user = User::archive(&state.db, &claims, parse_id(&id)?, Utc::now()).await?;
    Ok(Json(user))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    User::delete(&state.db, &claims, parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
