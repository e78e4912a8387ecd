//! Flat key-value storage - the fallback and backstop backend.
//!
//! Values are JSON strings under fixed keys, mirroring a browser's local
//! storage. [`FileStore`] keeps one file per key; [`MemoryStore`] keeps a shared
//! map so that cloned handles behave like tabs of one origin.

use crate::errors::{Error, Result};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Key holding the full dataset snapshot.
pub const DATA_KEY: &str = "digital_library_data_v1";
/// Key holding the session pointer `{currentUserId}`.
pub const AUTH_KEY: &str = "digital_library_auth_v1";
/// Key holding the cart line items.
pub const CART_KEY: &str = "digital_library_cart_v1";

/// Synchronous string storage shared by every session of one device.
pub trait KeyValueStore: Send + Sync + Debug {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Reads and decodes the JSON value under `key`.
///
/// # Errors
/// Returns `Error::Serialization` when the stored text is not valid JSON for
/// `T`; callers decide whether to reset the key.
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Like [`load_json`], but treats corrupted JSON as absent and logs a warning.
pub fn load_json_or_reset<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>> {
    match load_json(store, key) {
        Err(Error::Serialization(e)) => {
            warn!(key, error = %e, "Corrupted JSON in flat storage, resetting");
            Ok(None)
        }
        other => other,
    }
}

pub fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens (and creates if needed) the storage directory.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        debug!(dir = %dir.as_ref().display(), "Flat storage directory ready");
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        // Write-then-rename so a crash never leaves half a value behind.
        let target = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &target)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory storage; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, String>>> {
        self.entries.lock().map_err(|_| Error::Storage {
            message: "memory store lock poisoned".to_string(),
        })
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Pointer {
        current: Option<String>,
    }

    #[test]
    fn test_file_store_set_get_remove() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FileStore::open(dir.path().join("nested"))?;

        assert_eq!(store.get("missing")?, None);
        store.set("k", "{\"a\":1}")?;
        assert_eq!(store.get("k")?.as_deref(), Some("{\"a\":1}"));
        store.remove("k")?;
        store.remove("k")?;
        assert_eq!(store.get("k")?, None);
        Ok(())
    }

    #[test]
    fn test_memory_store_clones_share_state() -> Result<()> {
        let tab_a = MemoryStore::new();
        let tab_b = tab_a.clone();

        save_json(&tab_a, AUTH_KEY, &Pointer { current: Some("u-1".into()) })?;
        let seen: Option<Pointer> = load_json(&tab_b, AUTH_KEY)?;
        assert_eq!(seen.unwrap().current.as_deref(), Some("u-1"));
        Ok(())
    }

    #[test]
    fn test_corrupted_json_resets() -> Result<()> {
        let store = MemoryStore::new();
        store.set(CART_KEY, "[{not json")?;

        assert!(matches!(
            load_json::<Vec<Pointer>>(&store, CART_KEY),
            Err(Error::Serialization(_))
        ));
        assert_eq!(load_json_or_reset::<Vec<Pointer>>(&store, CART_KEY)?, None);
        Ok(())
    }
}
