//! Service error taxonomy.

use std::fmt;

use tessera_crypto::CryptoError;
use tessera_proto::{DeviceId, ProtocolError};
use thiserror::Error;

use crate::{storage::StorageError, transport::TransportError};

/// The entity an error refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    /// A device, by id
    Device(DeviceId),
    /// A topic, by name
    Topic(String),
}

impl Entity {
    /// Shorthand for `Entity::Topic(topic.to_string())`.
    pub fn topic(topic: &str) -> Self {
        Self::Topic(topic.to_string())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(id) => write!(f, "device {id}"),
            Self::Topic(name) => write!(f, "topic {name:?}"),
        }
    }
}

/// Errors returned by the key store, orchestrator and dispatcher.
///
/// Errors propagate unchanged to the caller. Nothing is retried or rolled back
/// automatically.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum C2Error {
    /// The referenced device or topic does not exist.
    #[error("{0} not found")]
    NotFound(Entity),

    /// A stored key failed authentication under the KEK.
    ///
    /// Either the record was tampered with or the KEK is wrong. Never
    /// reported as `NotFound`.
    #[error("stored key for {0} is corrupted")]
    CorruptedData(Entity),

    /// Malformed input (empty topic name, bad id, missing command field).
    #[error("invalid input: {0}")]
    Validation(String),

    /// The transport refused the message. Nothing was committed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The persistence layer failed.
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// `remove_listener` found no matching registration.
    #[error("listener not registered")]
    ListenerNotFound,

    /// A cryptographic primitive failed outside of record authentication
    /// (entropy source, key derivation).
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl C2Error {
    /// Returns true for `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<StorageError> for C2Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DeviceNotFound(id) => Self::NotFound(Entity::Device(id)),
            StorageError::TopicNotFound(topic) => Self::NotFound(Entity::Topic(topic)),
            other => Self::Storage(other),
        }
    }
}

impl From<ProtocolError> for C2Error {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Crypto(err) => Self::Crypto(err),
            other => Self::Validation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_not_found_becomes_not_found() {
        let id = DeviceId::from_bytes([0xab; 16]);
        let err = C2Error::from(StorageError::DeviceNotFound(id));
        assert_eq!(err, C2Error::NotFound(Entity::Device(id)));
        assert_eq!(err.to_string(), format!("device {id} not found"));

        let err = C2Error::from(StorageError::Io("disk full".to_string()));
        assert!(matches!(err, C2Error::Storage(_)));
    }

    #[test]
    fn protocol_errors_split_between_validation_and_crypto() {
        let err = C2Error::from(ProtocolError::InvalidIdLength { expected: 16, actual: 3 });
        assert!(matches!(err, C2Error::Validation(_)));

        let err = C2Error::from(ProtocolError::Crypto(CryptoError::Entropy("gone".to_string())));
        assert!(matches!(err, C2Error::Crypto(_)));
    }

    #[test]
    fn topic_names_are_quoted() {
        assert_eq!(Entity::topic("a/b").to_string(), "topic \"a/b\"");
    }
}
