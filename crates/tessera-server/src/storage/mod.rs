//! Storage abstraction for the key store
//!
//! Trait-based abstraction for persisting sealed device and topic keys and the
//! grants between them. The trait is synchronous (no async) and only ever sees
//! ciphertext: sealing under the KEK happens in [`KeyStore`](crate::KeyStore)
//! before a record reaches a backend.

mod chaotic;
mod error;
mod memory;
mod redb;

pub use chaotic::{ChaoticStorage, StorageOp};
pub use error::StorageError;
pub use memory::MemoryStorage;
use serde::{Deserialize, Serialize};
use tessera_proto::DeviceId;

pub use self::redb::RedbStorage;

/// A key sealed under the KEK, as persisted by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredKey {
    /// `nonce || ciphertext || tag` of the 32-byte key.
    pub sealed_key: Vec<u8>,
    /// Unix timestamp (seconds) of the last write.
    pub updated_at_secs: u64,
}

/// Storage abstraction for sealed keys and grants
///
/// Must be Clone (shared between the key store and diagnostics), Send + Sync
/// (thread-safe), and synchronous. Implementations share internal state via
/// Arc, so clones access the same underlying storage.
///
/// Every method is atomic: a concurrent caller observes either none or all of
/// its effects. Cascading deletes in particular never leave a grant pointing
/// at a missing device or topic.
///
/// # Panics
///
/// Implementations may panic if internal synchronization primitives are
/// poisoned. Acceptable for test/simulation code.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Store a device's sealed root key, replacing any prior value.
    fn store_device_key(&self, id: &DeviceId, key: &StoredKey) -> Result<(), StorageError>;

    /// Load a device's sealed root key. `None` if the device is unknown.
    fn load_device_key(&self, id: &DeviceId) -> Result<Option<StoredKey>, StorageError>;

    /// Delete a device and every grant that references it.
    ///
    /// Returns `false` (and changes nothing) if the device was not stored.
    fn delete_device(&self, id: &DeviceId) -> Result<bool, StorageError>;

    /// Store a topic's sealed key, creating the topic or replacing its key.
    fn store_topic_key(&self, topic: &str, key: &StoredKey) -> Result<(), StorageError>;

    /// Load a topic's sealed key. `None` if the topic is unknown.
    fn load_topic_key(&self, topic: &str) -> Result<Option<StoredKey>, StorageError>;

    /// Delete a topic and every grant that references it.
    ///
    /// Returns `false` (and changes nothing) if the topic was not stored.
    fn delete_topic(&self, topic: &str) -> Result<bool, StorageError>;

    /// Record a grant between a device and a topic. Idempotent.
    ///
    /// Returns `false` if the grant already existed.
    ///
    /// # Errors
    ///
    /// - `StorageError::DeviceNotFound` if the device is not stored
    /// - `StorageError::TopicNotFound` if the topic is not stored
    fn link(&self, id: &DeviceId, topic: &str) -> Result<bool, StorageError>;

    /// Remove a grant. Returns `false` if it did not exist.
    fn unlink(&self, id: &DeviceId, topic: &str) -> Result<bool, StorageError>;

    /// Topics granted to a device, sorted by name.
    ///
    /// `None` if the device is unknown.
    fn topics_for_device(&self, id: &DeviceId) -> Result<Option<Vec<String>>, StorageError>;

    /// Devices granted a topic, sorted by id.
    ///
    /// `None` if the topic is unknown.
    fn devices_for_topic(&self, topic: &str) -> Result<Option<Vec<DeviceId>>, StorageError>;

    /// Every stored device, sorted by id.
    fn list_devices(&self) -> Result<Vec<DeviceId>, StorageError>;

    /// Every stored topic, sorted by name.
    fn list_topics(&self) -> Result<Vec<String>, StorageError>;
}
