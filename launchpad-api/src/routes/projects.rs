/// Project endpoints
///
/// A project created without `account_id` lands in the caller's current account.

use crate::{app::AppState, error::ApiResult, routes::ListParams};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use launchpad_shared::{
    auth::claims::Claims,
    models::project::{CreateProject, Project, UpdateProject},
    validation::parse_id,
};

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Project>>> {
    let projects = Project::find(&state.db, &claims, &params.into_request()).await?;
    Ok(Json(projects))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateProject>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let project = Project::create(&state.db, &claims, req, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> ApiResult<Json<Project>> {
    let project = Project::read(&state.db, &claims, parse_id(&id)?, false).await?;
    Ok(Json(project))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<UpdateProject>,
) -> ApiResult<Json<Project>> {
    let project = Project::update(&state.db, &claims, parse_id(&id)?, req, Utc::now()).await?;
    Ok(Json(project))
}

pub async fn archive(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> ApiResult<Json<Project>> {
    let project = Project::archive(&state.db, &claims, parse_id(&id)?, Utc::now()).await?;
    Ok(Json(project))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    Project::delete(&state.db, &claims, parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
