//! Storage error types.

use tessera_proto::DeviceId;
use thiserror::Error;

/// Errors from a [`Storage`](super::Storage) backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Backend I/O failure (disk, transaction, injected fault).
    ///
    /// May be transient. The operation had no effect.
    #[error("storage I/O error: {0}")]
    Io(String),

    /// A stored record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A grant referenced a device that is not stored
    #[error("device not found: {0}")]
    DeviceNotFound(DeviceId),

    /// A grant referenced a topic that is not stored
    #[error("topic not found: {0}")]
    TopicNotFound(String),
}

impl StorageError {
    /// Returns true if this is an I/O failure that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
