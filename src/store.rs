use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ACCESS_TOKEN_KEY;
use crate::error::PerfError;

/// Key-value session storage shared by everything that talks to the
/// backend. Writes are last-write-wins; there are no transactions.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String) -> Result<(), PerfError>;
    fn evict(&self, key: &str) -> Result<(), PerfError>;
}

pub type SharedStore = Arc<dyn SessionStore>;

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(Self::new())
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<(), PerfError> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn evict(&self, key: &str) -> Result<(), PerfError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// JSON-file backed store. The whole map is rewritten on every change.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load_entries(&path);
        debug!("Session store opened at {:?} ({} keys)", path, entries.len());
        FileStore {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), PerfError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| PerfError::Store(format!("Failed to serialize session: {}", e)))?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

fn load_entries(path: &Path) -> BTreeMap<String, String> {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Ignoring unreadable session store {:?}: {}", path, e);
            BTreeMap::new()
        }),
        Err(_) => BTreeMap::new(),
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<(), PerfError> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value);
        self.persist(&entries)
    }

    fn evict(&self, key: &str) -> Result<(), PerfError> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}

pub fn access_token(store: &dyn SessionStore) -> Option<String> {
    store.get(ACCESS_TOKEN_KEY).filter(|t| !t.trim().is_empty())
}

pub fn set_access_token(store: &dyn SessionStore, token: &str) -> Result<(), PerfError> {
    store.set(ACCESS_TOKEN_KEY, token.trim().to_string())
}

pub fn clear_access_token(store: &dyn SessionStore) -> Result<(), PerfError> {
    store.evict(ACCESS_TOKEN_KEY)
}
