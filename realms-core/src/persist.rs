//! Save/load of the full game state.
//!
//! The save is a single JSON document under a well-known key in a
//! [`Storage`] collaborator. Any key/value store works; this module ships an
//! in-memory store and a directory-of-files store.

use crate::state::GameState;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tokio::fs;

/// Storage key of the one save slot.
pub const SAVE_SLOT: &str = "infinite_realms_save";

/// Errors from a storage collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage is full")]
    Full,

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors from save/load operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("a turn is in progress")]
    TurnInFlight,
}

/// String key/value storage.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    async fn clear(&self, key: &str) -> Result<(), StorageError>;
}

/// Serialize a state to its save document.
pub fn encode(state: &GameState) -> Result<String, PersistError> {
    Ok(serde_json::to_string(state)?)
}

/// Parse a save document. A missing `imageSize` falls back to the lowest tier.
pub fn decode(document: &str) -> Result<GameState, PersistError> {
    Ok(serde_json::from_str(document)?)
}

/// Write `state` to the save slot.
pub async fn save(storage: &dyn Storage, state: &GameState) -> Result<(), PersistError> {
    let document = encode(state)?;
    storage.set(SAVE_SLOT, &document).await?;
    Ok(())
}

/// Read the save slot, if anything is in it.
pub async fn load(storage: &dyn Storage) -> Result<Option<GameState>, PersistError> {
    match storage.get(SAVE_SLOT).await? {
        Some(document) => Ok(Some(decode(&document)?)),
        None => Ok(None),
    }
}

/// Whether the save slot holds anything.
pub async fn has_save(storage: &dyn Storage) -> Result<bool, PersistError> {
    Ok(storage.get(SAVE_SLOT).await?.is_some())
}

pub async fn delete_save(storage: &dyn Storage) -> Result<(), PersistError> {
    storage.clear(SAVE_SLOT).await?;
    Ok(())
}

/// Current time in epoch milliseconds, as stored in `savedAt`.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Process-local storage with an optional byte quota.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes that would push the total stored bytes past `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            entries: Mutex::default(),
            quota: Some(bytes),
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(quota) = self.quota {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if others + key.len() + value.len() > quota {
                return Err(StorageError::Full);
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let sanitized = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect::<String>();
        self.dir.join(format!("{sanitized}.json"))
    }
}

fn storage_error(err: std::io::Error) -> StorageError {
    match err.kind() {
        ErrorKind::StorageFull => StorageError::Full,
        _ => StorageError::Unavailable(err.to_string()),
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error(e)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).await.map_err(storage_error)?;

        // Write beside the target and rename so a failed write never
        // truncates the previous save.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        if let Err(e) = fs::write(&tmp, value).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(storage_error(e));
        }
        fs::rename(&tmp, &path).await.map_err(storage_error)
    }

    async fn clear(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(e)),
        }
    }
}
