/// Membership endpoints under `/v1/user_accounts`
///
/// A membership is addressed by its `(user_id, account_id)` pair: in the body
/// for `PATCH`, in the query string for `DELETE`.

use crate::{app::AppState, error::ApiResult, routes::ListParams};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use launchpad_shared::{
    auth::claims::Claims,
    models::membership::{AddMembership, Membership, UpdateMembership},
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct MembershipKey {
    pub user_id: Uuid,
    pub account_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PatchMembership {
    #[serde(flatten)]
    pub key: MembershipKey,

    #[serde(flatten)]
    pub changes: UpdateMembership,

    /// Archives the membership; other changes are ignored
    #[serde(default)]
    pub archive: bool,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Membership>>> {
    let memberships = Membership::find(&state.db, &claims, &params.into_request()).await?;
    Ok(Json(memberships))
}

pub async fn add(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddMembership>,
) -> ApiResult<(StatusCode, Json<Membership>)> {
    let membership = Membership::add(&state.db, &claims, req, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(membership)))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PatchMembership>,
) -> ApiResult<Json<Membership>> {
    let MembershipKey { user_id, account_id } = req.key;

    let membership = if req.archive {
        Membership::archive(&state.db, &claims, user_id, account_id, Utc::now()).await?
    } else {
        Membership::update(&state.db, &claims, user_id, account_id, req.changes, Utc::now()).await?
    };
    Ok(Json(membership))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(key): Query<MembershipKey>,
) -> ApiResult<StatusCode> {
    Membership::delete(&state.db, &claims, key.user_id, key.account_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
