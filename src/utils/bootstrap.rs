//! Bootstrap utilities for embedders.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, ConfigError, LOG_ENV_VAR};
use crate::storage::{init_storage, StorageError, Stores};

/// Initialize tracing with REFERRAL_LOG environment variable.
///
/// Defaults to "info" level if REFERRAL_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Load configuration and open the configured storage backend.
///
/// See [`Config::load`] for the source order.
pub async fn bootstrap(config_path: Option<&str>) -> Result<(Config, Stores), BootstrapError> {
    let config = Config::load(config_path).map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    let stores = init_storage(&config.storage).await?;
    Ok((config, stores))
}
