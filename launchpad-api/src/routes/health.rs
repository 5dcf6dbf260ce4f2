/// Health check endpoint
///
/// ```text
/// GET /health
/// ```
///
/// ```json
/// { "status": "healthy", "version": "0.1.0", "database": "connected", "signing_key": "3f9a0c..." }
/// ```

use crate::app::AppState;
use axum::{extract::State, Json};
use launchpad_shared::db::pool::health_check as database_health;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`
    pub status: String,
    pub version: String,
    pub database: String,

    /// `kid` of the key new tokens are signed with
    pub signing_key: String,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected = database_health(&state.db).await.is_ok();

    Json(HealthResponse {
        status: if connected { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: if connected { "connected" } else { "disconnected" }.to_string(),
        signing_key: state.authenticator.keys().current().kid.clone(),
    })
}
