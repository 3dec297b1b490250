//! Encrypted key store.
//!
//! [`KeyStore`] seals every device root key and topic key under the KEK before
//! handing it to a [`Storage`] backend, and authenticates it on the way back.
//! Backends therefore only ever hold ciphertext.
//!
//! # Invariants
//!
//! - A record that fails authentication is reported as `CorruptedData`, never
//!   as `NotFound` and never as a key.
//! - Deleting a device or topic removes its grants in the same storage
//!   operation.
//! - Decrypted key bytes are wiped as soon as they are copied into a [`Key`].

use std::sync::Arc;

use tessera_crypto::{Key, KdfParams, decrypt, derive_kek_with_params, encrypt};
use tessera_proto::DeviceId;
use zeroize::Zeroize;

use crate::{
    C2Error, Entity,
    clock::{Clock, SystemClock},
    storage::{Storage, StoredKey},
};

/// Encrypted store of device root keys, topic keys and grants.
pub struct KeyStore<S: Storage> {
    storage: S,
    kek: Key,
    clock: Arc<dyn Clock>,
}

impl<S: Storage> KeyStore<S> {
    /// Wrap a backend with an already derived KEK.
    pub fn new(storage: S, kek: Key) -> Self {
        Self { storage, kek, clock: Arc::new(SystemClock) }
    }

    /// Derive the KEK from a passphrase and wrap the backend.
    ///
    /// The same passphrase always yields the same KEK, so a store reopened
    /// after a restart can read its records.
    pub fn open(storage: S, passphrase: &str, params: &KdfParams) -> Result<Self, C2Error> {
        let kek = derive_kek_with_params(passphrase, params)?;
        Ok(Self::new(storage, kek))
    }

    /// Replace the clock used to stamp records.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Underlying backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Seal and store a device root key, replacing any previous key.
    pub fn insert_id_key(&self, id: &DeviceId, key: &Key) -> Result<(), C2Error> {
        let record = self.seal(key)?;
        self.storage.store_device_key(id, &record)?;
        Ok(())
    }

    /// Delete a device and all of its grants.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the device does not exist
    pub fn delete_id_key(&self, id: &DeviceId) -> Result<(), C2Error> {
        if self.storage.delete_device(id)? {
            Ok(())
        } else {
            Err(C2Error::NotFound(Entity::Device(*id)))
        }
    }

    /// Decrypt a device's root key.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the device does not exist
    /// - `CorruptedData` if the stored record fails authentication
    pub fn get_id_key(&self, id: &DeviceId) -> Result<Key, C2Error> {
        let record = self.load_id_record(id)?;
        self.unseal(&record).map_err(|()| C2Error::CorruptedData(Entity::Device(*id)))
    }

    /// When the device's root key was last written (Unix seconds).
    pub fn id_key_updated_at(&self, id: &DeviceId) -> Result<u64, C2Error> {
        Ok(self.load_id_record(id)?.updated_at_secs)
    }

    /// Seal and store a topic key, creating the topic if needed.
    ///
    /// # Errors
    ///
    /// - `Validation` if the topic name is unusable
    pub fn insert_topic_key(&self, topic: &str, key: &Key) -> Result<(), C2Error> {
        validate_topic(topic)?;
        let record = self.seal(key)?;
        self.storage.store_topic_key(topic, &record)?;
        Ok(())
    }

    /// Delete a topic and all of its grants.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the topic does not exist
    pub fn delete_topic_key(&self, topic: &str) -> Result<(), C2Error> {
        validate_topic(topic)?;
        if self.storage.delete_topic(topic)? {
            Ok(())
        } else {
            Err(C2Error::NotFound(Entity::topic(topic)))
        }
    }

    /// Decrypt a topic key.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the topic does not exist
    /// - `CorruptedData` if the stored record fails authentication
    pub fn get_topic_key(&self, topic: &str) -> Result<Key, C2Error> {
        validate_topic(topic)?;
        let record = self
            .storage
            .load_topic_key(topic)?
            .ok_or_else(|| C2Error::NotFound(Entity::topic(topic)))?;
        self.unseal(&record).map_err(|()| C2Error::CorruptedData(Entity::topic(topic)))
    }

    /// Record that a device is granted a topic. Idempotent.
    ///
    /// # Errors
    ///
    /// - `NotFound` if either the device or the topic does not exist
    pub fn link_id_topic(&self, id: &DeviceId, topic: &str) -> Result<bool, C2Error> {
        validate_topic(topic)?;
        Ok(self.storage.link(id, topic)?)
    }

    /// Remove a grant. Returns `false` if there was none.
    pub fn unlink_id_topic(&self, id: &DeviceId, topic: &str) -> Result<bool, C2Error> {
        validate_topic(topic)?;
        Ok(self.storage.unlink(id, topic)?)
    }

    /// Topics granted to a device, sorted by name.
    pub fn topics_for_id(&self, id: &DeviceId) -> Result<Vec<String>, C2Error> {
        self.storage.topics_for_device(id)?.ok_or(C2Error::NotFound(Entity::Device(*id)))
    }

    /// Devices granted a topic, sorted by id.
    pub fn ids_for_topic(&self, topic: &str) -> Result<Vec<DeviceId>, C2Error> {
        validate_topic(topic)?;
        self.storage
            .devices_for_topic(topic)?
            .ok_or_else(|| C2Error::NotFound(Entity::topic(topic)))
    }

    /// Every enrolled device, sorted by id.
    pub fn list_ids(&self) -> Result<Vec<DeviceId>, C2Error> {
        Ok(self.storage.list_devices()?)
    }

    /// Every topic, sorted by name.
    pub fn list_topics(&self) -> Result<Vec<String>, C2Error> {
        Ok(self.storage.list_topics()?)
    }

    /// Number of enrolled devices.
    pub fn count_ids(&self) -> Result<usize, C2Error> {
        Ok(self.storage.list_devices()?.len())
    }

    /// Number of topics.
    pub fn count_topics(&self) -> Result<usize, C2Error> {
        Ok(self.storage.list_topics()?.len())
    }

    fn load_id_record(&self, id: &DeviceId) -> Result<StoredKey, C2Error> {
        self.storage.load_device_key(id)?.ok_or(C2Error::NotFound(Entity::Device(*id)))
    }

    fn seal(&self, key: &Key) -> Result<StoredKey, C2Error> {
        let sealed_key = encrypt(&self.kek, None, key.as_bytes())?;
        Ok(StoredKey { sealed_key, updated_at_secs: self.clock.now_secs() })
    }

    /// Authenticate and decrypt a record. The caller names the entity.
    fn unseal(&self, record: &StoredKey) -> Result<Key, ()> {
        let mut plaintext = decrypt(&self.kek, None, &record.sealed_key).map_err(|err| {
            tracing::debug!(error = %err, "stored key failed authentication");
        })?;
        let key = Key::try_from(plaintext.as_slice()).map_err(|err| {
            tracing::debug!(error = %err, "stored key has wrong length");
        });
        plaintext.zeroize();
        key
    }
}

/// Check that a topic name can be stored and published to.
///
/// # Errors
///
/// - `Validation` if the name is empty or contains a subscription wildcard
///   (`+`, `#`) or NUL, none of which a publish topic may carry
pub fn validate_topic(topic: &str) -> Result<(), C2Error> {
    if topic.is_empty() {
        return Err(C2Error::Validation("topic name is empty".to_string()));
    }
    if topic.contains(['+', '#', '\0']) {
        return Err(C2Error::Validation(format!("topic name {topic:?} contains '+', '#' or NUL")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualClock, storage::MemoryStorage};

    fn store() -> KeyStore<MemoryStorage> {
        KeyStore::new(MemoryStorage::new(), Key::from_bytes([0x11; 32]))
    }

    #[test]
    fn records_are_stamped_with_clock() {
        let clock = ManualClock::new(1_000);
        let store = store().with_clock(clock.clone());
        let id = DeviceId::from_bytes([1; 16]);

        store.insert_id_key(&id, &Key::from_bytes([2; 32])).unwrap();
        assert_eq!(store.id_key_updated_at(&id).unwrap(), 1_000);

        clock.advance(60);
        store.insert_id_key(&id, &Key::from_bytes([3; 32])).unwrap();
        assert_eq!(store.id_key_updated_at(&id).unwrap(), 1_060);
    }

    #[test]
    fn empty_and_wildcard_topics_are_rejected() {
        let store = store();
        let key = Key::from_bytes([4; 32]);

        for topic in ["", "a/+/b", "a/#", "nul\0"] {
            assert!(matches!(store.insert_topic_key(topic, &key), Err(C2Error::Validation(_))));
        }
        assert!(matches!(store.get_topic_key(""), Err(C2Error::Validation(_))));
    }

    #[test]
    fn wrong_kek_reads_as_corrupted() {
        let storage = MemoryStorage::new();
        let params = KdfParams::new(1024, 1, 1);
        let id = DeviceId::from_bytes([5; 16]);

        let writer = KeyStore::open(storage.clone(), "correct horse", &params).unwrap();
        writer.insert_id_key(&id, &Key::from_bytes([6; 32])).unwrap();

        let reader = KeyStore::open(storage, "battery staple", &params).unwrap();
        assert_eq!(reader.get_id_key(&id), Err(C2Error::CorruptedData(Entity::Device(id))));
    }

    #[test]
    fn same_passphrase_reopens_store() {
        let storage = MemoryStorage::new();
        let params = KdfParams::new(1024, 1, 1);

        let first = KeyStore::open(storage.clone(), "pw", &params).unwrap();
        first.insert_topic_key("t", &Key::from_bytes([7; 32])).unwrap();
        drop(first);

        let second = KeyStore::open(storage, "pw", &params).unwrap();
        assert_eq!(second.get_topic_key("t").unwrap(), Key::from_bytes([7; 32]));
    }
}
