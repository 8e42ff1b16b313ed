use super::{CheckpointStore, CheckpointStoreError};
use crate::shared::fs_atomic::{atomic_write_file, is_temp_file_name};
use crate::shared::ids::validate_identifier_value;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// On-disk record: the stored document plus a digest that catches truncated or
/// hand-edited files.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry {
    key: String,
    sha256: String,
    value: String,
}

/// One JSON file per key under `root`, each written with temp-file + rename.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    root: PathBuf,
}

impl FileCheckpointStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CheckpointStoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| io_error(&root, source))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf, CheckpointStoreError> {
        validate_identifier_value("checkpoint store key", key).map_err(|reason| {
            CheckpointStoreError::InvalidKey {
                key: key.to_string(),
                reason,
            }
        })?;
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&self, key: &str, value: &str) -> Result<(), CheckpointStoreError> {
        let path = self.entry_path(key)?;
        let entry = StoredEntry {
            key: key.to_string(),
            sha256: sha256_hex(value.as_bytes()),
            value: value.to_string(),
        };
        let body = serde_json::to_vec_pretty(&entry).map_err(|source| json_error(&path, source))?;
        atomic_write_file(&path, &body).map_err(|source| io_error(&path, source))
    }

    fn load(&self, key: &str) -> Result<Option<String>, CheckpointStoreError> {
        let path = self.entry_path(key)?;
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(io_error(&path, source)),
        };
        let entry: StoredEntry =
            serde_json::from_str(&raw).map_err(|source| json_error(&path, source))?;
        if entry.key != key {
            return Err(CheckpointStoreError::Corrupt {
                key: key.to_string(),
                reason: format!("file records key `{}`", entry.key),
            });
        }
        if entry.sha256 != sha256_hex(entry.value.as_bytes()) {
            return Err(CheckpointStoreError::Corrupt {
                key: key.to_string(),
                reason: "sha256 digest mismatch".to_string(),
            });
        }
        Ok(Some(entry.value))
    }

    fn delete(&self, key: &str) -> Result<bool, CheckpointStoreError> {
        let path = self.entry_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(source) if source.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(io_error(&path, source)),
        }
    }

    fn list(&self) -> Result<Vec<String>, CheckpointStoreError> {
        let entries = fs::read_dir(&self.root).map_err(|source| io_error(&self.root, source))?;
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| io_error(&self.root, source))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|value| value.to_str()) else {
                continue;
            };
            if is_temp_file_name(name) {
                continue;
            }
            if let Some(key) = name.strip_suffix(".json") {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    const HEX: &[u8; 16] = b"0123456789abcdef";
    for byte in digest.iter() {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

fn io_error(path: &Path, source: std::io::Error) -> CheckpointStoreError {
    CheckpointStoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn json_error(path: &Path, source: serde_json::Error) -> CheckpointStoreError {
    CheckpointStoreError::Json {
        path: path.display().to_string(),
        source,
    }
}
