use tracing::warn;

use crate::config::EXECUTIONS_KEY;
use crate::error::PerfError;
use crate::models::ExecutionRecord;
use crate::store::SharedStore;

/// Locally recorded executions, newest first, capped at `capacity`.
///
/// Eviction is by truncation after every write, so the oldest entries go
/// first. Two writers racing on the same store both read, prepend and
/// truncate; the later write wins and the cap still holds.
#[derive(Clone)]
pub struct ExecutionHistory {
    store: SharedStore,
    capacity: usize,
}

impl ExecutionHistory {
    pub fn new(store: SharedStore, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current entries. An oversized stored list is truncated and written back.
    pub fn entries(&self) -> Vec<ExecutionRecord> {
        let mut entries = self.load();
        if entries.len() > self.capacity {
            entries.truncate(self.capacity);
            if let Err(e) = self.save(&entries) {
                warn!("Failed to trim execution history: {}", e);
            }
        }
        entries
    }

    pub fn record(&self, entry: ExecutionRecord) -> Result<(), PerfError> {
        let mut entries = self.load();
        entries.insert(0, entry);
        entries.truncate(self.capacity);
        self.save(&entries)
    }

    /// Apply `f` to the entry with `id`. Returns false if it has already
    /// been evicted.
    pub fn update<F>(&self, id: &str, f: F) -> Result<bool, PerfError>
    where
        F: FnOnce(&mut ExecutionRecord),
    {
        let mut entries = self.load();
        let Some(entry) = entries.iter_mut().find(|e| e.id == id) else {
            return Ok(false);
        };
        f(entry);
        entries.truncate(self.capacity);
        self.save(&entries)?;
        Ok(true)
    }

    pub fn clear(&self) -> Result<(), PerfError> {
        self.store.evict(EXECUTIONS_KEY)
    }

    fn load(&self) -> Vec<ExecutionRecord> {
        match self.store.get(EXECUTIONS_KEY) {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Discarding unreadable execution history: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        }
    }

    fn save(&self, entries: &[ExecutionRecord]) -> Result<(), PerfError> {
        let json = serde_json::to_string(entries)
            .map_err(|e| PerfError::Store(format!("Failed to serialize execution history: {}", e)))?;
        self.store.set(EXECUTIONS_KEY, json)
    }
}
