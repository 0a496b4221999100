//! Error type for storage backend operations.

/// Errors from a [`crate::StorageBackend`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A read operation failed.
    #[error("storage read failed: {reason}")]
    Read { reason: String },

    /// A write operation failed.
    #[error("storage write failed: {reason}")]
    Write { reason: String },

    /// A delete operation failed.
    #[error("storage delete failed: {reason}")]
    Delete { reason: String },

    /// A list operation failed.
    #[error("storage list failed: {reason}")]
    List { reason: String },
}
