//! Persistent key-value storage.
//!
//! Values are stored as JSON. Two backends are provided:
//! - [`FileStore`]: one JSON file per key in the platform config directory:
//!   - Linux: `~/.config/walletsync/`
//!   - macOS: `~/Library/Application Support/walletsync/`
//!   - Windows: `%APPDATA%\walletsync\`
//! - [`MemoryStore`]: process-local, used by tests and by several sync
//!   contexts that stand in for browser tabs sharing one origin.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{de::DeserializeOwned, Serialize};

/// Durable currency preference, read at session start.
pub const PREFERRED_CURRENCY_KEY: &str = "walletsync.preferred_currency";
/// Persisted session (username + credential token).
pub const SESSION_KEY: &str = "walletsync.session";
/// Cross-tab slot carrying the latest canonical balance update.
pub const BALANCE_UPDATE_KEY: &str = "walletsync.balance_update";

/// Raw string storage. Typed access goes through [`save`] and [`load`].
pub trait KeyValueStore: Send + Sync {
    /// Returns `true` if the operation succeeded.
    fn save_raw(&self, key: &str, value: &str) -> bool;
    fn load_raw(&self, key: &str) -> Option<String>;
    fn remove_raw(&self, key: &str);
}

/// Save a value to persistent storage.
///
/// Returns `true` if the operation succeeded.
pub fn save<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(json) => store.save_raw(key, &json),
        Err(_) => false,
    }
}

/// Load a value from persistent storage.
///
/// Returns `None` if the key doesn't exist or deserialization fails.
pub fn load<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let json = store.load_raw(key)?;
    serde_json::from_str(&json).ok()
}

/// Remove a value from persistent storage.
pub fn remove(store: &dyn KeyValueStore, key: &str) {
    store.remove_raw(key);
}

/// Check if a key exists in storage.
pub fn exists(store: &dyn KeyValueStore, key: &str) -> bool {
    store.load_raw(key).is_some()
}

// =========================================
// File-backed implementation
// =========================================

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Store rooted at the platform config directory. `None` if the platform
    /// has no config directory or it cannot be created.
    pub fn in_config_dir() -> Option<Self> {
        let dir = dirs::config_dir()?.join("walletsync");
        Self::at(dir)
    }

    pub fn at(dir: impl Into<PathBuf>) -> Option<Self> {
        let dir = dir.into();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).ok()?;
        }
        Some(Self { dir })
    }

    fn file_path(&self, key: &str) -> PathBuf {
        // Sanitize key to be a valid filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.dir.join(format!("{}.json", safe_key))
    }
}

impl KeyValueStore for FileStore {
    fn save_raw(&self, key: &str, value: &str) -> bool {
        // Readers in other processes only ever see a complete file.
        let path = self.file_path(key);
        let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        if std::fs::write(&tmp, value).is_err() {
            return false;
        }
        if std::fs::rename(&tmp, &path).is_err() {
            let _ = std::fs::remove_file(&tmp);
            return false;
        }
        true
    }

    fn load_raw(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.file_path(key)).ok()
    }

    fn remove_raw(&self, key: &str) {
        let _ = std::fs::remove_file(self.file_path(key));
    }
}

// =========================================
// In-memory implementation
// =========================================

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn save_raw(&self, key: &str, value: &str) -> bool {
        match self.entries.lock() {
            Ok(mut entries) => {
                entries.insert(key.to_string(), value.to_string());
                true
            }
            Err(_) => false,
        }
    }

    fn load_raw(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn remove_raw(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }
}
