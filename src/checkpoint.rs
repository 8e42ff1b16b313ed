use std::sync::Arc;

pub mod file_store;
pub mod memory_store;
pub mod model;
pub mod sqlite_store;

pub use file_store::FileCheckpointStore;
pub use memory_store::MemoryCheckpointStore;
pub use model::{Checkpoint, CheckpointReason};
pub use sqlite_store::SqliteCheckpointStore;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointStoreError {
    #[error("checkpoint store io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("checkpoint store json error at {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("sqlite open failed at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("sqlite statement failed: {source}")]
    Sql {
        #[source]
        source: rusqlite::Error,
    },
    #[error("invalid checkpoint store key `{key}`: {reason}")]
    InvalidKey { key: String, reason: String },
    #[error("stored value for `{key}` is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("checkpoint store lock poisoned")]
    Poisoned,
}

/// Key-value capability backing checkpoint persistence.
///
/// Keys are opaque strings and values are serialized checkpoint documents; the
/// store knows nothing about plans. `save` must be atomic: a concurrent or later
/// `load` sees either the previous value or the complete new one.
pub trait CheckpointStore: Send + Sync {
    fn save(&self, key: &str, value: &str) -> Result<(), CheckpointStoreError>;

    fn load(&self, key: &str) -> Result<Option<String>, CheckpointStoreError>;

    /// Returns whether a value was present.
    fn delete(&self, key: &str) -> Result<bool, CheckpointStoreError>;

    fn list(&self) -> Result<Vec<String>, CheckpointStoreError>;
}

impl<S: CheckpointStore + ?Sized> CheckpointStore for Arc<S> {
    fn save(&self, key: &str, value: &str) -> Result<(), CheckpointStoreError> {
        (**self).save(key, value)
    }

    fn load(&self, key: &str) -> Result<Option<String>, CheckpointStoreError> {
        (**self).load(key)
    }

    fn delete(&self, key: &str) -> Result<bool, CheckpointStoreError> {
        (**self).delete(key)
    }

    fn list(&self) -> Result<Vec<String>, CheckpointStoreError> {
        (**self).list()
    }
}
