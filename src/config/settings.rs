//! Application settings loaded from `config.toml`.
//!
//! Every section has defaults, so a missing file yields a working demo store:
//! flat storage under `./data`, a `SQLite` structured store next to it, no tax,
//! free shipping and a payment mock that waits 600 ms and declines about 2% of
//! calls. `DATABASE_URL` and `LIBRARY_DATA_DIR` from the environment (or `.env`)
//! override the file.

use crate::config::database::DEFAULT_DATABASE_URL;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub checkout: CheckoutConfig,
    pub payment: PaymentConfig,
    pub sync: SyncConfig,
    /// Optional TOML file with `[[books]]` used to seed the catalog
    pub catalog_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the flat key-value files
    pub data_dir: PathBuf,
    /// Structured store URL; `None` means the host has no structured storage
    pub database_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database_url: Some(DEFAULT_DATABASE_URL.to_string()),
        }
    }
}

/// Pricing applied on top of the cart subtotal.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct CheckoutConfig {
    /// Fraction of the subtotal charged as tax
    pub tax_rate: f64,
    /// Flat shipping amount per order
    pub shipping: f64,
}

/// Behaviour of the mocked payment gateway.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct PaymentConfig {
    pub delay_ms: u64,
    /// Probability in `0..=1` that a valid payment is declined
    pub decline_rate: f64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            delay_ms: 600,
            decline_rate: 0.02,
        }
    }
}

impl PaymentConfig {
    #[must_use]
    pub const fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    /// Buffered messages per cross-tab channel before slow listeners lag
    pub channel_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
        }
    }
}

/// Loads the configuration from a TOML file.
///
/// # Errors
/// Returns an error if the file cannot be read or the TOML is invalid.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    tracing::debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse {}: {e}", path_ref.display()),
    })
}

/// Loads `path` if it exists, otherwise returns the defaults. Environment
/// overrides are applied in both cases.
pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let mut config = if path.as_ref().exists() {
        load_config(path)?
    } else {
        tracing::info!(
            "No configuration file at {}, using defaults",
            path.as_ref().display()
        );
        AppConfig::default()
    };
    config.apply_env_overrides();
    Ok(config)
}

/// Loads configuration from the default location (./config.toml)
pub fn load_default_config() -> Result<AppConfig> {
    load_or_default("config.toml")
}

impl AppConfig {
    /// Applies `DATABASE_URL` and `LIBRARY_DATA_DIR` from the environment.
    /// An empty `DATABASE_URL` disables the structured store.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.storage.database_url = if url.trim().is_empty() {
                None
            } else {
                Some(url)
            };
        }
        if let Ok(dir) = std::env::var("LIBRARY_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
    }
}
