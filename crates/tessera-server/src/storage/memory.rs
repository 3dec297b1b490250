#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex},
};

use tessera_proto::DeviceId;

use super::{Storage, StorageError, StoredKey};

/// In-memory storage implementation for testing and simulation
///
/// Ordered maps keep query results deterministic. All state sits behind one
/// Arc<Mutex<>>, so every operation (cascades included) is atomic and clones
/// share the same data. Uses `lock().expect()` which will panic if the mutex
/// is poisoned - acceptable for test code.
#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

struct MemoryStorageInner {
    devices: BTreeMap<DeviceId, StoredKey>,
    topics: BTreeMap<String, StoredKey>,
    /// (device, topic) pairs, ordered by device first
    grants: BTreeSet<(DeviceId, String)>,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryStorageInner {
                devices: BTreeMap::new(),
                topics: BTreeMap::new(),
                grants: BTreeSet::new(),
            })),
        }
    }

    /// Total number of grants across all devices.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn grant_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").grants.len()
    }

    /// Overwrite a stored device record without going through the key store.
    ///
    /// Lets tests simulate on-disk corruption.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn tamper_device_key(&self, id: &DeviceId, f: impl FnOnce(&mut Vec<u8>)) -> bool {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        match inner.devices.get_mut(id) {
            Some(record) => {
                f(&mut record.sealed_key);
                true
            },
            None => false,
        }
    }

    /// Overwrite a stored topic record without going through the key store.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn tamper_topic_key(&self, topic: &str, f: impl FnOnce(&mut Vec<u8>)) -> bool {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        match inner.topics.get_mut(topic) {
            Some(record) => {
                f(&mut record.sealed_key);
                true
            },
            None => false,
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    #[allow(clippy::expect_used)]
    fn store_device_key(&self, id: &DeviceId, key: &StoredKey) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.devices.insert(*id, key.clone());
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn load_device_key(&self, id: &DeviceId) -> Result<Option<StoredKey>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.devices.get(id).cloned())
    }

    #[allow(clippy::expect_used)]
    fn delete_device(&self, id: &DeviceId) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        if inner.devices.remove(id).is_none() {
            return Ok(false);
        }

        inner.grants.retain(|(device, _)| device != id);
        Ok(true)
    }

    #[allow(clippy::expect_used)]
    fn store_topic_key(&self, topic: &str, key: &StoredKey) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.topics.insert(topic.to_string(), key.clone());
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn load_topic_key(&self, topic: &str) -> Result<Option<StoredKey>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.topics.get(topic).cloned())
    }

    #[allow(clippy::expect_used)]
    fn delete_topic(&self, topic: &str) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        if inner.topics.remove(topic).is_none() {
            return Ok(false);
        }

        inner.grants.retain(|(_, granted)| granted != topic);
        Ok(true)
    }

    #[allow(clippy::expect_used)]
    fn link(&self, id: &DeviceId, topic: &str) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        if !inner.devices.contains_key(id) {
            return Err(StorageError::DeviceNotFound(*id));
        }
        if !inner.topics.contains_key(topic) {
            return Err(StorageError::TopicNotFound(topic.to_string()));
        }

        Ok(inner.grants.insert((*id, topic.to_string())))
    }

    #[allow(clippy::expect_used)]
    fn unlink(&self, id: &DeviceId, topic: &str) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.grants.remove(&(*id, topic.to_string())))
    }

    #[allow(clippy::expect_used)]
    fn topics_for_device(&self, id: &DeviceId) -> Result<Option<Vec<String>>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        if !inner.devices.contains_key(id) {
            return Ok(None);
        }

        let topics = inner
            .grants
            .iter()
            .filter(|(device, _)| device == id)
            .map(|(_, topic)| topic.clone())
            .collect();
        Ok(Some(topics))
    }

    #[allow(clippy::expect_used)]
    fn devices_for_topic(&self, topic: &str) -> Result<Option<Vec<DeviceId>>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        if !inner.topics.contains_key(topic) {
            return Ok(None);
        }

        let devices = inner
            .grants
            .iter()
            .filter(|(_, granted)| granted == topic)
            .map(|(device, _)| *device)
            .collect();
        Ok(Some(devices))
    }

    #[allow(clippy::expect_used)]
    fn list_devices(&self) -> Result<Vec<DeviceId>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.devices.keys().copied().collect())
    }

    #[allow(clippy::expect_used)]
    fn list_topics(&self) -> Result<Vec<String>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.topics.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(byte: u8) -> StoredKey {
        StoredKey { sealed_key: vec![byte; 8], updated_at_secs: 0 }
    }

    #[test]
    fn link_requires_both_endpoints() {
        let storage = MemoryStorage::new();
        let id = DeviceId::from_bytes([1; 16]);

        assert_eq!(storage.link(&id, "t"), Err(StorageError::DeviceNotFound(id)));

        storage.store_device_key(&id, &record(1)).unwrap();
        assert_eq!(storage.link(&id, "t"), Err(StorageError::TopicNotFound("t".to_string())));

        storage.store_topic_key("t", &record(2)).unwrap();
        assert!(storage.link(&id, "t").unwrap());
        assert!(!storage.link(&id, "t").unwrap());
        assert_eq!(storage.grant_count(), 1);
    }

    #[test]
    fn delete_device_cascades_grants() {
        let storage = MemoryStorage::new();
        let a = DeviceId::from_bytes([1; 16]);
        let b = DeviceId::from_bytes([2; 16]);
        storage.store_device_key(&a, &record(1)).unwrap();
        storage.store_device_key(&b, &record(2)).unwrap();
        storage.store_topic_key("t", &record(3)).unwrap();
        storage.link(&a, "t").unwrap();
        storage.link(&b, "t").unwrap();

        assert!(storage.delete_device(&a).unwrap());
        assert!(!storage.delete_device(&a).unwrap());
        assert_eq!(storage.devices_for_topic("t").unwrap(), Some(vec![b]));
    }

    #[test]
    fn topics_for_unknown_device_is_none() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.topics_for_device(&DeviceId::from_bytes([9; 16])).unwrap(), None);
        assert_eq!(storage.devices_for_topic("nope").unwrap(), None);
    }
}
