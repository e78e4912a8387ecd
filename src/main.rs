use digital_library::config::settings::load_default_config;
use digital_library::core::{PersistenceCoordinator, SyncChannel, SyncListener};
use digital_library::errors::Result;
use digital_library::storage::FileStore;
use dotenvy::dotenv;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Load the application configuration (config.toml + environment)
    let config = load_default_config()
        .inspect_err(|e| error!("Critical error loading application configuration: {e}"))?;

    // 4. Flat storage under the data directory
    let flat = FileStore::open(&config.storage.data_dir)
        .inspect_err(|e| error!("Failed to open data directory: {e}"))?;

    // 5. Boot the coordinator; it picks the structured store or the flat fallback
    let channel = SyncChannel::new(config.sync.channel_capacity);
    let coordinator = Arc::new(PersistenceCoordinator::from_config(
        &config,
        Arc::new(flat),
        &channel,
    )?);
    coordinator
        .initialize()
        .await
        .inspect_err(|e| error!("Failed to load store data: {e}"))?;

    let listener = SyncListener::new(Arc::clone(&coordinator)).spawn();

    let stats = coordinator.store_stats().await?;
    info!(
        backend = ?coordinator.backend(),
        books = stats.books,
        users = stats.users,
        orders = stats.orders,
        "Storefront ready"
    );

    // 6. Run until interrupted
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    listener.abort();
    Ok(())
}
