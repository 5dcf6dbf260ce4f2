//! # Launchpad API Server
//!
//! Multi-tenant account management and access control over HTTP.
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/launchpad cargo run -p launchpad-api
//! ```

use std::sync::Arc;

use launchpad_api::{
    app::{build_router, AppState},
    config::Config,
    keys,
};
use launchpad_shared::auth::jwt::Authenticator;
use launchpad_shared::db::{
    migrations::run_migrations,
    pool::{close_pool, create_pool, DatabaseConfig},
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "launchpad_api=debug,launchpad_shared=info,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.api.production);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Launchpad API server starting"
    );

    let mut db_config = DatabaseConfig::new(config.database.url.clone());
    db_config.max_connections = config.database.max_connections;
    let pool = create_pool(db_config).await?;
    run_migrations(&pool).await?;

    let store = Arc::new(keys::build_key_store(&config.keys).await?);
    let shutdown = CancellationToken::new();
    let rotation = keys::spawn_rotation(
        store.clone(),
        keys::refresh_interval(&config.keys),
        shutdown.clone(),
    );

    let bind_address = config.bind_address();
    let state = AppState::new(pool.clone(), Authenticator::new(store), config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %bind_address, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(e) = rotation.await {
        tracing::warn!(error = %e, "Key rotation task ended abnormally");
    }
    close_pool(pool).await;

    tracing::info!("Server stopped");
    Ok(())
}
