/// Signing key store wiring
///
/// Builds the [`KeyStore`] for the configured source and keeps it rotated in
/// the background. Several API instances may share one source: each refresh
/// picks up keys minted by the others.

use std::sync::Arc;

use chrono::Utc;
use launchpad_shared::auth::keystore::{
    FileKeySource, KeySource, KeyStore, MemoryKeySource, RotationPolicy, SecretsManagerKeySource,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{KeySourceConfig, KeysConfig};

pub async fn build_key_source(config: &KeySourceConfig) -> Arc<dyn KeySource> {
    match config {
        KeySourceConfig::SecretsManager { secret_id } => {
            Arc::new(SecretsManagerKeySource::from_env(secret_id.clone()).await)
        }
        KeySourceConfig::File { path } => Arc::new(FileKeySource::new(path.clone())),
        KeySourceConfig::Memory => {
            tracing::warn!("Signing keys are held in memory; tokens will not survive a restart");
            Arc::new(MemoryKeySource::new())
        }
    }
}

/// Loads the key set, minting a first key if the source has none
pub async fn build_key_store(config: &KeysConfig) -> anyhow::Result<KeyStore> {
    let source = build_key_source(&config.source).await;
    let store = KeyStore::new(source, RotationPolicy::new(config.expiration()), Utc::now()).await?;

    tracing::info!(
        kid = %store.current().kid,
        keys = store.keys().len(),
        "Signing keys loaded"
    );
    Ok(store)
}

/// How often the background task refreshes the key set
pub fn refresh_interval(config: &KeysConfig) -> std::time::Duration {
    let quarter = config.expiration() / 4;
    let interval = quarter
        .to_std()
        .unwrap_or(std::time::Duration::from_secs(3600));
    interval.clamp(
        std::time::Duration::from_secs(60),
        std::time::Duration::from_secs(3600),
    )
}

/// Refreshes `store` every `interval` until `shutdown` fires
pub fn spawn_rotation(
    store: Arc<KeyStore>,
    interval: std::time::Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("Key rotation stopped");
                    return;
                }
                _ = ticker.tick() => {
                    match store.rotate(Utc::now()).await {
                        Ok(key) => tracing::debug!(kid = %key.kid, "Signing keys refreshed"),
                        Err(e) => tracing::error!(error = %e, "Signing key refresh failed"),
                    }
                }
            }
        }
    })
}
