//! Key-value storage abstraction behind the cache.
//!
//! The engine only ever sees the [`Store`] trait, so an in-memory map, a
//! file-backed document, or any other persistent key-value surface satisfy it
//! interchangeably. Implementations report capacity pressure as
//! [`StoreError::CapacityExceeded`]; the cache layer reacts with eviction,
//! never the store itself.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::StoreError;

/// Minimal synchronous key-value surface. All methods take `&self`;
/// implementations are internally synchronized.
pub trait Store: Send + Sync {
    /// Raw value for `key`, or `None` when absent.
    fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Persists `value` under `key`, replacing any prior value atomically
    /// from the reader's point of view.
    fn set_raw(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes `key` if present. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// All keys currently present, in no particular order.
    fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// Removes every key starting with `prefix`.
    fn clear_prefix(&self, prefix: &str) -> Result<(), StoreError> {
        for key in self.keys()? {
            if key.starts_with(prefix) {
                self.remove(&key)?;
            }
        }
        Ok(())
    }
}

/// Heap-backed store with an optional byte budget.
///
/// The budget exists so capacity-pressure handling is exercisable in tests
/// and in ephemeral configurations; `None` means unbounded.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    capacity_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity_bytes: None,
        }
    }

    pub fn with_capacity_bytes(capacity_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity_bytes: Some(capacity_bytes),
        }
    }

    fn used_bytes(entries: &HashMap<String, String>) -> usize {
        entries.values().map(String::len).sum()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.lock()?;
        if let Some(budget) = self.capacity_bytes {
            let without_old = Self::used_bytes(&entries)
                - entries.get(key).map(String::len).unwrap_or(0);
            if without_old + value.len() > budget {
                return Err(StoreError::CapacityExceeded);
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}

/// Store persisted as a single JSON document on disk.
///
/// Writes go through a sibling temp file and an atomic rename, so readers
/// never observe a partially written document even across processes. A byte
/// budget caps the serialized document size.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
    capacity_bytes: Option<usize>,
}

impl FileStore {
    /// Opens (or creates) the store at `path`. A corrupt or unreadable
    /// document starts the store empty rather than failing: the cache is a
    /// performance layer, losing it is always safe.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(map) => map,
                Err(err) => {
                    tracing::warn!("discarding corrupt store document at {path:?}: {err}");
                    HashMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
            capacity_bytes: None,
        })
    }

    pub fn with_capacity_bytes(mut self, capacity_bytes: usize) -> Self {
        self.capacity_bytes = Some(capacity_bytes);
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))
    }

    fn flush(&self, entries: &HashMap<String, String>) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(entries)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        if let Some(budget) = self.capacity_bytes
            && serialized.len() > budget
        {
            return Err(StoreError::CapacityExceeded);
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &serialized)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Store for FileStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.lock()?;
        let previous = entries.insert(key.to_string(), value.to_string());
        match self.flush(&entries) {
            Ok(()) => Ok(()),
            Err(err) => {
                // Roll the map back so memory and disk stay in agreement.
                match previous {
                    Some(old) => entries.insert(key.to_string(), old),
                    None => entries.remove(key),
                };
                Err(err)
            }
        }
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.lock()?;
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    fn clear_prefix(&self, prefix: &str) -> Result<(), StoreError> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        if entries.len() != before {
            self.flush(&entries)?;
        }
        Ok(())
    }
}
