//! Persisted client state.
//!
//! A small string key/value store for the session: the two tokens, the
//! serialized user and the device id. [`FileStorage`] keeps one JSON file per
//! profile under `~/.eventhub/`; [`MemoryStorage`] is for tests and
//! short-lived embeddings.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::StorageError;

/// Keys of the persisted client state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StorageKey {
    AccessToken,
    RefreshToken,
    User,
    DeviceId,
}

impl StorageKey {
    /// Keys that belong to a login session. The device id outlives sessions.
    pub const SESSION_KEYS: [StorageKey; 3] = [
        StorageKey::AccessToken,
        StorageKey::RefreshToken,
        StorageKey::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessToken => "accessToken",
            Self::RefreshToken => "refreshToken",
            Self::User => "user",
            Self::DeviceId => "deviceId",
        }
    }
}

/// Key/value storage for session state.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError>;

    fn set(&self, key: StorageKey, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: StorageKey) -> Result<(), StorageError>;
}

/// Storage that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: RwLock<BTreeMap<StorageKey, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(&key).cloned())
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), StorageError> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.remove(&key);
        Ok(())
    }
}

/// Storage backed by a JSON file.
///
/// The whole file is rewritten on every change; it holds four short strings.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Storage for `profile` under `~/.eventhub/session.<profile>.json`.
    pub fn for_profile(profile: &str) -> Result<Self, StorageError> {
        let dir = dirs::home_dir()
            .ok_or(StorageError::HomeDir)?
            .join(".eventhub");
        fs::create_dir_all(&dir)?;
        Ok(Self::new(dir.join(format!("session.{profile}.json"))))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, values: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(values)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
        Ok(self.load()?.remove(key.as_str()))
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), StorageError> {
        let mut values = self.load()?;
        values.insert(key.as_str().to_string(), value.to_string());
        self.save(&values)
    }

    fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
        let mut values = self.load()?;
        if values.remove(key.as_str()).is_some() {
            self.save(&values)?;
        }
        Ok(())
    }
}
