//! Durable key/value slot for the auth credential.
//!
//! SYSTEM CONTEXT
//! ==============
//! The auth store persists its token under [`AUTH_TOKEN_KEY`] and the HTTP
//! client reads the same slot before every request. `FileStorage` writes a
//! small JSON map under the user config directory (0600 on Unix);
//! `MemoryStorage` backs tests and throwaway sessions.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Fixed storage key holding the bearer token across restarts.
pub const AUTH_TOKEN_KEY: &str = "auth-token";

const STORAGE_FILE_NAME: &str = "storage.json";

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("could not determine a config directory for token storage")]
    NoConfigDir,
    #[error("storage io failed for {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("storage file is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

// =============================================================================
// TRAIT
// =============================================================================

/// Synchronous key/value storage, the moral equivalent of browser local storage.
pub trait TokenStorage: Send + Sync {
    /// Read a value. Missing keys and unreadable backends both yield `None`.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot persist the value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a value. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot persist the removal.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// =============================================================================
// MEMORY
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        values.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }
}

// =============================================================================
// FILE
// =============================================================================

/// JSON-file storage. Every call re-reads the file so separate processes
/// sharing the same path observe each other's login and logout.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    /// Storage at `<config dir>/animaforge/storage.json`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoConfigDir`] if the platform has no config dir.
    pub fn in_config_dir() -> Result<Self, StorageError> {
        let dir = dirs::config_dir().ok_or(StorageError::NoConfigDir)?;
        Ok(Self::new(dir.join("animaforge").join(STORAGE_FILE_NAME)))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => return Err(StorageError::Io { path: self.path.clone(), source }),
        };
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io { path: self.path.clone(), source };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let contents = serde_json::to_string_pretty(map)?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path).map_err(io_err)?;
        #[cfg(unix)]
        {
            // `mode` only applies to newly created files.
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600)).map_err(io_err)?;
        }
        file.write_all(contents.as_bytes()).map_err(io_err)?;
        Ok(())
    }

    fn update<F>(&self, mutate: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let _guard = self.write_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        // A corrupt file is replaced rather than blocking logout forever.
        let mut map = self.read_map().unwrap_or_else(|e| {
            tracing::warn!(error = %e, path = %self.path.display(), "discarding unreadable token storage");
            BTreeMap::new()
        });
        mutate(&mut map);
        self.write_map(&map)
    }
}

impl TokenStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        match self.read_map() {
            Ok(mut map) => map.remove(key),
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "token storage read failed");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|map| {
            map.insert(key.to_owned(), value.to_owned());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        if !self.path.exists() {
            return Ok(());
        }
        self.update(|map| {
            map.remove(key);
        })
    }
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
