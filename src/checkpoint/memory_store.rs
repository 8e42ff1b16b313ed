use super::{CheckpointStore, CheckpointStoreError};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Process-local store, used in tests and for ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, CheckpointStoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| CheckpointStoreError::Poisoned)?;
        Ok(entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, CheckpointStoreError> {
        Ok(self.len()? == 0)
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save(&self, key: &str, value: &str) -> Result<(), CheckpointStoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CheckpointStoreError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>, CheckpointStoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| CheckpointStoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<bool, CheckpointStoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CheckpointStoreError::Poisoned)?;
        Ok(entries.remove(key).is_some())
    }

    fn list(&self) -> Result<Vec<String>, CheckpointStoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| CheckpointStoreError::Poisoned)?;
        Ok(entries.keys().cloned().collect())
    }
}
