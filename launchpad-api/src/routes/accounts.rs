/// Account endpoints

use crate::{app::AppState, error::ApiResult, routes::ListParams};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use launchpad_shared::{
    auth::claims::Claims,
    models::account::{Account, CreateAccount, UpdateAccount},
    validation::parse_id,
};

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Account>>> {
    let accounts = Account::find(&state.db, &claims, &params.into_request()).await?;
    Ok(Json(accounts))
}

/// Creates an account; the caller becomes its admin
pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateAccount>,
) -> ApiResult<(StatusCode, Json<Account>)> {
    let account = Account::create(&state.db, &claims, req, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> ApiResult<Json<Account>> {
    let account = Account::read(&state.db, &claims, parse_id(&id)?, false).await?;
    Ok(Json(account))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<UpdateAccount>,
) -> ApiResult<Json<Account>> {
    let account = Account::update(&state.db, &claims, parse_id(&id)?, req, Utc::now()).await?;
    Ok(Json(account))
}

pub async fn archive(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> ApiResult<Json<Account>> {
    let account = Account::archive(&state.db, &claims, parse_id(&id)?, Utc::now()).await?;
    Ok(Json(account))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    Account::delete(&state.db, &claims, parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
