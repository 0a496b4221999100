//! Append-only, hash-chained forensic log.
//!
//! Every entry commits to the previous entry's hash, the canonical JSON of
//! its payload, and its seal timestamp, so any retroactive edit or deletion
//! breaks the chain at the point of tampering. Canonicalization relies on
//! `serde_json::Map`'s default `BTreeMap`-backed ordering — this workspace
//! must never enable `serde_json`'s `preserve_order` feature, or entry
//! hashes computed today would stop matching entries verified tomorrow.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use authority_storage::StorageBackend;

use crate::error::LogError;

/// Hash of an empty chain; the `prev_hash` of the first entry ever written.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000";

/// One sealed forensic record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub sequence: u64,
    pub event: String,
    pub payload: serde_json::Value,
    pub sealed_at: DateTime<Utc>,
    pub prev_hash: String,
    pub entry_hash: String,
}

fn compute_hash(prev_hash: &str, payload: &serde_json::Value, sealed_at: DateTime<Utc>) -> String {
    let canonical = payload.to_string();
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(canonical.as_bytes());
    hasher.update(sealed_at.to_rfc3339().as_bytes());
    hex::encode(hasher.finalize())
}

/// In-memory hash-chained log with an optional durable mirror.
///
/// Writes are synchronous (`std::sync::Mutex`-guarded) so the FSM, quorum
/// gate, and lease manager — all of which must write forensic entries
/// without ever `.await`ing — can call [`ForensicLog::seal`] directly.
/// Mirroring an entry to a [`StorageBackend`] is a separate async step,
/// driven only from the dispatcher's already-async pipeline.
pub struct ForensicLog {
    entries: Mutex<Vec<LogEntry>>,
    sealed: Mutex<bool>,
}

impl ForensicLog {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            sealed: Mutex::new(false),
        }
    }

    /// Append a new entry to the chain, synchronously. Returns the sealed
    /// entry (including its computed hash) for the caller to mirror later.
    pub fn seal(&self, event: impl Into<String>, payload: serde_json::Value) -> Result<LogEntry, LogError> {
        if *self.sealed.lock() {
            return Err(LogError::LogSealed);
        }

        let mut entries = self.entries.lock();
        let sequence = entries.len() as u64;
        let prev_hash = entries
            .last()
            .map_or_else(|| GENESIS_HASH.to_owned(), |e| e.entry_hash.clone());
        let sealed_at = Utc::now();
        let entry_hash = compute_hash(&prev_hash, &payload, sealed_at);

        let entry = LogEntry {
            sequence,
            event: event.into(),
            payload,
            sealed_at,
            prev_hash,
            entry_hash,
        };
        entries.push(entry.clone());
        tracing::info!(sequence, event = %entry.event, "forensic entry sealed");
        Ok(entry)
    }

    /// Permanently disallow further writes. Irreversible.
    pub fn finalize(&self) {
        let mut sealed = self.sealed.lock();
        *sealed = true;
    }

    /// Mirror one entry to a durable backend, keyed by zero-padded sequence
    /// number so a prefix `list` returns entries in chain order.
    pub async fn mirror(&self, entry: &LogEntry, backend: &dyn StorageBackend) -> Result<(), authority_storage::StorageError> {
        let key = format!("forensic/{:020}", entry.sequence);
        let bytes = serde_json::to_vec(entry)
            .unwrap_or_else(|_| b"{}".to_vec());
        backend.put(&key, &bytes).await
    }

    /// Verify that every entry's `prev_hash`/`entry_hash` linkage is intact.
    /// Returns the index of the first corrupted entry, if any.
    #[must_use]
    pub fn verify(&self) -> Result<(), LogError> {
        let entries = self.entries.lock();
        let mut expected_prev = GENESIS_HASH.to_owned();
        for entry in entries.iter() {
            if entry.prev_hash != expected_prev {
                return Err(LogError::ChainCorruption {
                    first_bad_entry: entry.sequence as usize,
                });
            }
            let recomputed = compute_hash(&entry.prev_hash, &entry.payload, entry.sealed_at);
            if recomputed != entry.entry_hash {
                return Err(LogError::ChainCorruption {
                    first_bad_entry: entry.sequence as usize,
                });
            }
            expected_prev = entry.entry_hash.clone();
        }
        Ok(())
    }

    /// Snapshot of every entry sealed so far, in chain order.
    #[must_use]
    pub fn export(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ForensicLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ForensicLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForensicLog")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
