//! Append-only, newline-delimited JSON file storage backend.
//!
//! Every write appends one line to the backing file; nothing is ever
//! rewritten in place. An in-memory index is rebuilt by replaying the file
//! on open, then kept in sync with each subsequent write. This mirrors the
//! append-only file handling of an audit log backend, extended just enough
//! to answer `get`/`list` queries without re-reading the whole file on
//! every call.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::{StorageBackend, StorageError};

#[derive(Serialize, Deserialize)]
struct Record {
    key: String,
    /// `None` marks a tombstone (deletion).
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<Vec<u8>>,
}

struct Index {
    /// Current value per key, `None` for tombstoned keys still present in
    /// the index (kept so prefix scans don't need to re-scan the file).
    values: BTreeMap<String, Option<Vec<u8>>>,
}

/// An append-only storage backend that persists to a newline-delimited
/// JSON file.
pub struct FileBackend {
    path: PathBuf,
    writer: Mutex<tokio::fs::File>,
    index: Mutex<Index>,
}

impl FileBackend {
    /// Open (or create) the backing file and rebuild the in-memory index by
    /// replaying its contents.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the file exists but cannot be read,
    /// or [`StorageError::Write`] if it cannot be opened for append.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        let mut values = BTreeMap::new();
        if let Ok(read_file) = tokio::fs::File::open(&path).await {
            let mut lines = BufReader::new(read_file).lines();
            loop {
                let line = lines
                    .next_line()
                    .await
                    .map_err(|e| StorageError::Read {
                        reason: format!("failed to read '{}': {e}", path.display()),
                    })?;
                let Some(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let record: Record =
                    serde_json::from_str(&line).map_err(|e| StorageError::Read {
                        reason: format!("corrupt record in '{}': {e}", path.display()),
                    })?;
                values.insert(record.key, record.value);
            }
        }

        let writer = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StorageError::Write {
                reason: format!("failed to open '{}' for append: {e}", path.display()),
            })?;

        Ok(Self {
            path,
            writer: Mutex::new(writer),
            index: Mutex::new(Index { values }),
        })
    }

    async fn append(&self, record: &Record) -> Result<(), StorageError> {
        let mut line = serde_json::to_vec(record).map_err(|e| StorageError::Write {
            reason: format!("serialization failed: {e}"),
        })?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|e| StorageError::Write {
                reason: format!("write to '{}' failed: {e}", self.path.display()),
            })?;
        writer.flush().await.map_err(|e| StorageError::Write {
            reason: format!("flush of '{}' failed: {e}", self.path.display()),
        })
    }
}

#[async_trait::async_trait]
impl StorageBackend for FileBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let index = self.index.lock().await;
        Ok(index.values.get(key).cloned().flatten())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.append(&Record {
            key: key.to_owned(),
            value: Some(value.to_vec()),
        })
        .await?;

        let mut index = self.index.lock().await;
        index.values.insert(key.to_owned(), Some(value.to_vec()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.append(&Record {
            key: key.to_owned(),
            value: None,
        })
        .await?;

        let mut index = self.index.lock().await;
        index.values.insert(key.to_owned(), None);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let index = self.index.lock().await;
        Ok(index
            .values
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter(|(_, v)| v.is_some())
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let index = self.index.lock().await;
        Ok(matches!(index.values.get(key), Some(Some(_))))
    }
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
