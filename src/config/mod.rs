/// Structured store connection and collection creation
pub mod database;

/// Seed catalog and default administrator
pub mod seed;

/// Application settings from config.toml and the environment
pub mod settings;

pub use settings::{AppConfig, CheckoutConfig, PaymentConfig, StorageConfig, SyncConfig};
