//! Durable storage for the serialized cart.
//!
//! The cart is a single JSON blob under [`CART_STORAGE_KEY`]. Storage is
//! synchronous: writes are small and happen while the cart lock is held so
//! the persisted blob always matches the in-memory lines.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

/// Well-known key the cart blob is stored under.
pub const CART_STORAGE_KEY: &str = "subshare_cart";

/// Errors that can occur when reading or writing cart storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("Cart storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Key-value storage for persisted client state.
pub trait CartStorage: Send + Sync {
    /// Read the blob stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage could not be read.
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage could not be written.
    fn save(&self, key: &str, blob: &str) -> Result<(), StorageError>;
}

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileCartStorage {
    dir: PathBuf,
}

impl FileCartStorage {
    /// Create storage rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl CartStorage for FileCartStorage {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path)(e)),
        }
    }

    fn save(&self, key: &str, blob: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;

        // Write to a sibling temp file and rename so a crash mid-write never
        // leaves a truncated cart behind.
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        {
            let mut file = fs::File::create(&tmp).map_err(io_error(&tmp))?;
            file.write_all(blob.as_bytes()).map_err(io_error(&tmp))?;
            file.sync_all().map_err(io_error(&tmp))?;
        }
        fs::rename(&tmp, &path).map_err(io_error(&path))
    }
}

/// In-process storage, for tests and embedders without a filesystem.
#[derive(Debug, Default)]
pub struct MemoryCartStorage {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryCartStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage pre-seeded with `blob` under `key`.
    #[must_use]
    pub fn with_blob(key: &str, blob: impl Into<String>) -> Self {
        let storage = Self::default();
        storage
            .blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), blob.into());
        storage
    }
}

impl CartStorage for MemoryCartStorage {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn save(&self, key: &str, blob: &str) -> Result<(), StorageError> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), blob.to_string());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_file_storage_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileCartStorage::new(dir.path());
        assert!(storage.load(CART_STORAGE_KEY).unwrap().is_none());
    }

    #[test]
    fn test_file_storage_creates_dir_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileCartStorage::new(dir.path().join("nested"));

        storage.save(CART_STORAGE_KEY, "first").unwrap();
        storage.save(CART_STORAGE_KEY, "second").unwrap();

        assert_eq!(
            storage.load(CART_STORAGE_KEY).unwrap().as_deref(),
            Some("second")
        );
        assert!(dir.path().join("nested/subshare_cart.json").exists());
        assert!(!dir.path().join("nested/.subshare_cart.json.tmp").exists());
    }

    #[test]
    fn test_memory_storage() {
        let storage = MemoryCartStorage::with_blob("k", "v");
        assert_eq!(storage.load("k").unwrap().as_deref(), Some("v"));
        storage.save("k", "w").unwrap();
        assert_eq!(storage.load("k").unwrap().as_deref(), Some("w"));
        assert!(storage.load("other").unwrap().is_none());
    }
}
