//src/storage.rs
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// Custom Error type for storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to get application data directory")]
    DataDir,
    #[error("I/O error accessing storage file for key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Flat string-keyed durable medium behind the persistent store.
///
/// Every value is the serialized form of a whole collection (or a scalar
/// counter); writes always replace the whole value. Implementations are
/// synchronous and assume a single writer.
pub trait StorageBackend {
    /// Returns the stored value for `key`, or `None` if the key has never
    /// been written.
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replaces the value stored under `key`.
    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes `key` if present. Removing an absent key is not an error.
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

const JOURNAL_DIR_NAME: &str = "knee-journal";

/// Gets the path to the journal data directory within the app's data directory.
pub fn get_data_dir() -> Result<PathBuf, StorageError> {
    let data_dir = dirs::data_dir().ok_or(StorageError::DataDir)?;
    let app_dir = data_dir.join(JOURNAL_DIR_NAME);
    if !app_dir.exists() {
        fs::create_dir_all(&app_dir).map_err(|source| StorageError::Io {
            key: app_dir.display().to_string(),
            source,
        })?;
    }
    Ok(app_dir)
}

/// File-backed storage: one file per key inside a data directory.
///
/// Keys map directly to file names, so callers must use keys that are valid
/// file name components (the store's fixed collection keys all are).
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Opens (creating if needed) a file-backed store rooted at `dir`.
    /// # Errors
    /// Returns `StorageError::Io` if the directory cannot be created.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
                key: dir.display().to_string(),
                source,
            })?;
        }
        Ok(Self { dir })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl StorageBackend for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.key_path(key);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|source| StorageError::Io {
                key: key.to_string(),
                source,
            })
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::write(self.key_path(key), value).map_err(|source| StorageError::Io {
            key: key.to_string(),
            source,
        })
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        let path = self.key_path(key);
        if path.exists() {
            fs::remove_file(&path).map_err(|source| StorageError::Io {
                key: key.to_string(),
                source,
            })?;
        }
        Ok(())
    }
}

/// In-memory storage fake for tests.
#[derive(Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a raw value under a key, bypassing the store. Used by tests to
    /// simulate corrupt or legacy payloads.
    pub fn put_raw(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }
}

impl StorageBackend for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}
