/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use launchpad_api::{app::{build_router, AppState}, config::Config, keys};
/// use launchpad_shared::auth::jwt::Authenticator;
/// use sqlx::PgPool;
/// use std::sync::Arc;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let store = keys::build_key_store(&config.keys).await?;
/// let state = AppState::new(pool, Authenticator::new(Arc::new(store)), config);
/// let app = build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{config::Config, error::ApiError, routes};
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, patch, post},
    Router,
};
use launchpad_shared::auth::jwt::Authenticator;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state, cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub authenticator: Authenticator,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: PgPool, authenticator: Authenticator, config: Config) -> Self {
        Self {
            db,
            authenticator,
            config: Arc::new(config),
        }
    }
}

/// Builds the router with every route and middleware
///
/// ```text
/// /
/// ├── GET  /health
/// └── /v1/
///     ├── POST  /signup                         (public)
///     ├── POST  /oauth/token                    (public, HTTP Basic)
///     ├── PATCH /users/switch-account/:account_id
///     ├── /users            GET POST, /:id GET PATCH DELETE, /:id/password, /:id/archive
///     ├── /accounts         GET POST, /:id GET PATCH DELETE, /:id/archive
///     ├── /user_accounts    GET POST PATCH DELETE
///     └── /projects         GET POST, /:id GET PATCH DELETE, /:id/archive
/// ```
///
/// Every route outside the public group requires a bearer token.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/signup", post(routes::auth::signup))
        .route("/oauth/token", post(routes::auth::token));

    let protected_routes = Router::new()
        .route(
            "/users/switch-account/:account_id",
            patch(routes::auth::switch_account),
        )
        .route("/users", get(routes::users::list).post(routes::users::create))
        .route(
            "/users/:id",
            get(routes::users::read)
                .patch(routes::users::update)
                .delete(routes::users::delete),
        )
        .route("/users/:id/password", patch(routes::users::update_password))
        .route("/users/:id/archive", patch(routes::users::archive))
        .route(
            "/accounts",
            get(routes::accounts::list).post(routes::accounts::create),
        )
        .route(
            "/accounts/:id",
            get(routes::accounts::read)
                .patch(routes::accounts::update)
                .delete(routes::accounts::delete),
        )
        .route("/accounts/:id/archive", patch(routes::accounts::archive))
        .route(
            "/user_accounts",
            get(routes::memberships::list)
                .post(routes::memberships::add)
                .patch(routes::memberships::update)
                .delete(routes::memberships::delete),
        )
        .route(
            "/projects",
            get(routes::projects::list).post(routes::projects::create),
        )
        .route(
            "/projects/:id",
            get(routes::projects::read)
                .patch(routes::projects::update)
                .delete(routes::projects::delete),
        )
        .route("/projects/:id/archive", patch(routes::projects::archive))
        .layer(middleware::from_fn_with_state(state.clone(), bearer_auth_layer));

    let v1_routes = Router::new().merge(public_routes).merge(protected_routes);

    let cors = if state.config.allows_any_origin() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state)
}

/// Returns the bearer token from an `Authorization` header value
pub fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Verifies the bearer token and inserts its `Claims` into request extensions
async fn bearer_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

    let claims = state
        .authenticator
        .verify(token)
        .map_err(launchpad_shared::Error::from)?;

    tracing::debug!(user_id = %claims.subject, account_id = %claims.audience, "Request authenticated");
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}
