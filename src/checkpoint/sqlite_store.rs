use super::{CheckpointStore, CheckpointStoreError};
use crate::shared::time::now_millis;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};

/// SQLite-backed store. A connection is opened per operation so the store is
/// `Send + Sync` without holding a connection across threads.
#[derive(Debug, Clone)]
pub struct SqliteCheckpointStore {
    db_path: PathBuf,
}

impl SqliteCheckpointStore {
    pub fn open(db_path: &Path) -> Result<Self, CheckpointStoreError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|source| CheckpointStoreError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn ensure_schema(&self) -> Result<(), CheckpointStoreError> {
        let connection = self.connect()?;
        connection
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS checkpoints (
                    key TEXT NOT NULL PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                ",
            )
            .map_err(|source| CheckpointStoreError::Sql { source })
    }

    fn connect(&self) -> Result<Connection, CheckpointStoreError> {
        let connection =
            Connection::open(&self.db_path).map_err(|source| CheckpointStoreError::Open {
                path: self.db_path.display().to_string(),
                source,
            })?;
        connection
            .execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|source| CheckpointStoreError::Sql { source })?;
        Ok(connection)
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn save(&self, key: &str, value: &str) -> Result<(), CheckpointStoreError> {
        let connection = self.connect()?;
        connection
            .execute(
                "
                INSERT INTO checkpoints (key, value, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    value=excluded.value,
                    updated_at=excluded.updated_at
                ",
                params![key, value, now_millis()],
            )
            .map_err(|source| CheckpointStoreError::Sql { source })?;
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>, CheckpointStoreError> {
        let connection = self.connect()?;
        connection
            .query_row(
                "SELECT value FROM checkpoints WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|source| CheckpointStoreError::Sql { source })
    }

    fn delete(&self, key: &str) -> Result<bool, CheckpointStoreError> {
        let connection = self.connect()?;
        let removed = connection
            .execute("DELETE FROM checkpoints WHERE key = ?1", params![key])
            .map_err(|source| CheckpointStoreError::Sql { source })?;
        Ok(removed > 0)
    }

    fn list(&self) -> Result<Vec<String>, CheckpointStoreError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare("SELECT key FROM checkpoints ORDER BY key")
            .map_err(|source| CheckpointStoreError::Sql { source })?;
        let rows = statement
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|source| CheckpointStoreError::Sql { source })?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row.map_err(|source| CheckpointStoreError::Sql { source })?);
        }
        Ok(keys)
    }
}
