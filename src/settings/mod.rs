//! View-state persistence against an external key-value store.
//!
//! The stored value is the JSON encoding of `ViewState` under a fixed key.
//! A corrupted value is discarded (and deleted) rather than surfaced.

mod debounce;

pub use debounce::Debouncer;

use crate::data::ViewState;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

pub const SETTINGS_KEY: &str = "boardview.settings";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("settings storage failed: {0}")]
    Storage(String),
    #[error("failed to encode settings: {0}")]
    Encode(String),
}

/// Namespaced async string store provided by the host
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, SettingsError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), SettingsError>;
    async fn remove(&self, key: &str) -> Result<(), SettingsError>;
}

/// In-memory store, mainly for tests
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.values.lock().await.contains_key(key)
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), SettingsError> {
        self.values.lock().await.remove(key);
        Ok(())
    }
}

/// Store backed by one JSON object file; every key is a string field.
///
/// Writes go to a temporary sibling first and are renamed into place.
#[derive(Debug)]
pub struct FileKvStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileKvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<Map<String, Value>, SettingsError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(SettingsError::Storage(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) | Err(_) => {
                tracing::warn!(
                    "Settings file {} is not a JSON object, starting empty",
                    self.path.display()
                );
                Ok(Map::new())
            }
        }
    }

    async fn write_all(&self, map: &Map<String, Value>) -> Result<(), SettingsError> {
        let storage = |e: std::io::Error| {
            SettingsError::Storage(format!("failed to write {}: {}", self.path.display(), e))
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(storage)?;
        }

        let content = serde_json::to_string_pretty(map)
            .map_err(|e| SettingsError::Encode(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await.map_err(storage)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(storage)?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for FileKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        let _guard = self.lock.lock().await;
        let map = self.read_all().await?;
        Ok(map.get(key).and_then(|v| v.as_str()).map(String::from))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_all().await?;
        map.insert(key.to_string(), Value::String(value.to_string()));
        self.write_all(&map).await
    }

    async fn remove(&self, key: &str) -> Result<(), SettingsError> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_all().await?;
        if map.remove(key).is_some() {
            self.write_all(&map).await?;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct SettingsStore {
    kv: Arc<dyn KvStore>,
    key: String,
}

impl SettingsStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            key: SETTINGS_KEY.to_string(),
        }
    }

    /// Load the saved view state.
    ///
    /// `Ok(None)` when nothing is stored or the stored value is corrupt (the
    /// corrupt entry is removed). Only storage failures are errors.
    pub async fn load(&self) -> Result<Option<ViewState>, SettingsError> {
        let Some(raw) = self.kv.get(&self.key).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<ViewState>(&raw) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                tracing::warn!("Discarding malformed settings under {}: {}", self.key, e);
                if let Err(remove_err) = self.kv.remove(&self.key).await {
                    tracing::warn!("Failed to delete malformed settings: {}", remove_err);
                }
                Ok(None)
            }
        }
    }

    pub async fn save(&self, state: &ViewState) -> Result<(), SettingsError> {
        let encoded =
            serde_json::to_string(state).map_err(|e| SettingsError::Encode(e.to_string()))?;
        self.kv.set(&self.key, &encoded).await?;
        tracing::debug!("Saved view settings ({} bytes)", encoded.len());
        Ok(())
    }
}
