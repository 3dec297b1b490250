//! Redb-backed persistent storage
//!
//! # Layout
//!
//! - `devices`: device id (16 bytes) -> CBOR [`StoredKey`]
//! - `topics`: topic name -> CBOR [`StoredKey`]
//! - `grants`: `device id || topic` -> empty
//! - `grants_by_topic`: `len(topic) as u32 BE || topic || device id` -> empty
//!
//! The two grant tables are always written together in one transaction, so
//! either direction can answer a query. The topic length prefix keeps
//! `"a"` from matching the range of `"ab"`.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};
use tessera_proto::{DEVICE_ID_SIZE, DeviceId};

use super::{Storage, StorageError, StoredKey};

/// Sealed device root keys, keyed by device id.
const DEVICES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("devices");

/// Sealed topic keys, keyed by topic name.
const TOPICS: TableDefinition<&str, &[u8]> = TableDefinition::new("topics");

/// Grants keyed device-first.
const GRANTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("grants");

/// Grants keyed topic-first (reverse index of `GRANTS`).
const GRANTS_BY_TOPIC: TableDefinition<&[u8], &[u8]> = TableDefinition::new("grants_by_topic");

const EMPTY: &[u8] = &[];

/// Redb storage implementation
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(DEVICES).map_err(|e| StorageError::Io(e.to_string()))?;
            let _ = txn.open_table(TOPICS).map_err(|e| StorageError::Io(e.to_string()))?;
            let _ = txn.open_table(GRANTS).map_err(|e| StorageError::Io(e.to_string()))?;
            let _ =
                txn.open_table(GRANTS_BY_TOPIC).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl Storage for RedbStorage {
    fn store_device_key(&self, id: &DeviceId, key: &StoredKey) -> Result<(), StorageError> {
        let bytes = encode_record(key)?;
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table = txn.open_table(DEVICES).map_err(|e| StorageError::Io(e.to_string()))?;
            table
                .insert(id.as_bytes().as_slice(), bytes.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        tracing::debug!(device = %id, "stored device key");
        Ok(())
    }

    fn load_device_key(&self, id: &DeviceId) -> Result<Option<StoredKey>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(DEVICES).map_err(|e| StorageError::Io(e.to_string()))?;

        match table.get(id.as_bytes().as_slice()).map_err(|e| StorageError::Io(e.to_string()))? {
            Some(value) => Ok(Some(decode_record(value.value())?)),
            None => Ok(None),
        }
    }

    fn delete_device(&self, id: &DeviceId) -> Result<bool, StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        let mut removed_grants = 0usize;
        {
            let mut devices =
                txn.open_table(DEVICES).map_err(|e| StorageError::Io(e.to_string()))?;
            let existed = devices
                .remove(id.as_bytes().as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?
                .is_some();
            if !existed {
                // Dropping the transaction aborts it
                return Ok(false);
            }

            let mut grants = txn.open_table(GRANTS).map_err(|e| StorageError::Io(e.to_string()))?;
            let mut reverse =
                txn.open_table(GRANTS_BY_TOPIC).map_err(|e| StorageError::Io(e.to_string()))?;

            for key in keys_with_prefix(&grants, id.as_bytes())? {
                let topic = decode_topic(&key[DEVICE_ID_SIZE..])?;
                grants.remove(key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;
                reverse
                    .remove(encode_reverse_key(topic, id).as_slice())
                    .map_err(|e| StorageError::Io(e.to_string()))?;
                removed_grants += 1;
            }
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        tracing::debug!(device = %id, removed_grants, "deleted device");
        Ok(true)
    }

    fn store_topic_key(&self, topic: &str, key: &StoredKey) -> Result<(), StorageError> {
        let bytes = encode_record(key)?;
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table = txn.open_table(TOPICS).map_err(|e| StorageError::Io(e.to_string()))?;
            table.insert(topic, bytes.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        tracing::debug!(topic, "stored topic key");
        Ok(())
    }

    fn load_topic_key(&self, topic: &str) -> Result<Option<StoredKey>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(TOPICS).map_err(|e| StorageError::Io(e.to_string()))?;

        match table.get(topic).map_err(|e| StorageError::Io(e.to_string()))? {
            Some(value) => Ok(Some(decode_record(value.value())?)),
            None => Ok(None),
        }
    }

    fn delete_topic(&self, topic: &str) -> Result<bool, StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        let mut removed_grants = 0usize;
        {
            let mut topics = txn.open_table(TOPICS).map_err(|e| StorageError::Io(e.to_string()))?;
            let existed =
                topics.remove(topic).map_err(|e| StorageError::Io(e.to_string()))?.is_some();
            if !existed {
                return Ok(false);
            }

            let mut grants = txn.open_table(GRANTS).map_err(|e| StorageError::Io(e.to_string()))?;
            let mut reverse =
                txn.open_table(GRANTS_BY_TOPIC).map_err(|e| StorageError::Io(e.to_string()))?;

            let prefix = encode_topic_prefix(topic);
            for key in keys_with_prefix(&reverse, &prefix)? {
                let id = decode_device(&key[prefix.len()..])?;
                reverse.remove(key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;
                grants
                    .remove(encode_grant_key(&id, topic).as_slice())
                    .map_err(|e| StorageError::Io(e.to_string()))?;
                removed_grants += 1;
            }
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        tracing::debug!(topic, removed_grants, "deleted topic");
        Ok(true)
    }

    fn link(&self, id: &DeviceId, topic: &str) -> Result<bool, StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        let created;
        {
            let devices = txn.open_table(DEVICES).map_err(|e| StorageError::Io(e.to_string()))?;
            if devices
                .get(id.as_bytes().as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?
                .is_none()
            {
                return Err(StorageError::DeviceNotFound(*id));
            }

            let topics = txn.open_table(TOPICS).map_err(|e| StorageError::Io(e.to_string()))?;
            if topics.get(topic).map_err(|e| StorageError::Io(e.to_string()))?.is_none() {
                return Err(StorageError::TopicNotFound(topic.to_string()));
            }

            let mut grants = txn.open_table(GRANTS).map_err(|e| StorageError::Io(e.to_string()))?;
            created = grants
                .insert(encode_grant_key(id, topic).as_slice(), EMPTY)
                .map_err(|e| StorageError::Io(e.to_string()))?
                .is_none();

            let mut reverse =
                txn.open_table(GRANTS_BY_TOPIC).map_err(|e| StorageError::Io(e.to_string()))?;
            reverse
                .insert(encode_reverse_key(topic, id).as_slice(), EMPTY)
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(created)
    }

    fn unlink(&self, id: &DeviceId, topic: &str) -> Result<bool, StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        let existed;
        {
            let mut grants = txn.open_table(GRANTS).map_err(|e| StorageError::Io(e.to_string()))?;
            existed = grants
                .remove(encode_grant_key(id, topic).as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?
                .is_some();

            let mut reverse =
                txn.open_table(GRANTS_BY_TOPIC).map_err(|e| StorageError::Io(e.to_string()))?;
            reverse
                .remove(encode_reverse_key(topic, id).as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(existed)
    }

    fn topics_for_device(&self, id: &DeviceId) -> Result<Option<Vec<String>>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;

        let devices = txn.open_table(DEVICES).map_err(|e| StorageError::Io(e.to_string()))?;
        let known = devices
            .get(id.as_bytes().as_slice())
            .map_err(|e| StorageError::Io(e.to_string()))?
            .is_some();
        if !known {
            return Ok(None);
        }

        let grants = txn.open_table(GRANTS).map_err(|e| StorageError::Io(e.to_string()))?;
        let topics = keys_with_prefix(&grants, id.as_bytes())?
            .iter()
            .map(|key| decode_topic(&key[DEVICE_ID_SIZE..]).map(str::to_string))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(topics))
    }

    fn devices_for_topic(&self, topic: &str) -> Result<Option<Vec<DeviceId>>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;

        let topics = txn.open_table(TOPICS).map_err(|e| StorageError::Io(e.to_string()))?;
        if topics.get(topic).map_err(|e| StorageError::Io(e.to_string()))?.is_none() {
            return Ok(None);
        }

        let reverse =
            txn.open_table(GRANTS_BY_TOPIC).map_err(|e| StorageError::Io(e.to_string()))?;
        let prefix = encode_topic_prefix(topic);
        let devices = keys_with_prefix(&reverse, &prefix)?
            .iter()
            .map(|key| decode_device(&key[prefix.len()..]))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(devices))
    }

    fn list_devices(&self) -> Result<Vec<DeviceId>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(DEVICES).map_err(|e| StorageError::Io(e.to_string()))?;

        let mut devices = Vec::new();
        for result in table.iter().map_err(|e| StorageError::Io(e.to_string()))? {
            let (key, _) = result.map_err(|e| StorageError::Io(e.to_string()))?;
            devices.push(decode_device(key.value())?);
        }

        Ok(devices)
    }

    fn list_topics(&self) -> Result<Vec<String>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(TOPICS).map_err(|e| StorageError::Io(e.to_string()))?;

        let mut topics = Vec::new();
        for result in table.iter().map_err(|e| StorageError::Io(e.to_string()))? {
            let (key, _) = result.map_err(|e| StorageError::Io(e.to_string()))?;
            topics.push(key.value().to_string());
        }

        Ok(topics)
    }
}

/// Collect every key in `table` starting with `prefix`, in key order.
fn keys_with_prefix<T: ReadableTable<&'static [u8], &'static [u8]>>(
    table: &T,
    prefix: &[u8],
) -> Result<Vec<Vec<u8>>, StorageError> {
    let mut keys = Vec::new();
    for result in table.range(prefix..).map_err(|e| StorageError::Io(e.to_string()))? {
        let (key, _) = result.map_err(|e| StorageError::Io(e.to_string()))?;
        let key = key.value();
        if !key.starts_with(prefix) {
            break;
        }
        keys.push(key.to_vec());
    }
    Ok(keys)
}

fn encode_record(record: &StoredKey) -> Result<Vec<u8>, StorageError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(record, &mut bytes)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode_record(bytes: &[u8]) -> Result<StoredKey, StorageError> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn encode_grant_key(id: &DeviceId, topic: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(DEVICE_ID_SIZE + topic.len());
    key.extend_from_slice(id.as_bytes());
    key.extend_from_slice(topic.as_bytes());
    key
}

fn encode_topic_prefix(topic: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(4 + topic.len() + DEVICE_ID_SIZE);
    prefix.extend_from_slice(&(topic.len() as u32).to_be_bytes());
    prefix.extend_from_slice(topic.as_bytes());
    prefix
}

fn encode_reverse_key(topic: &str, id: &DeviceId) -> Vec<u8> {
    let mut key = encode_topic_prefix(topic);
    key.extend_from_slice(id.as_bytes());
    key
}

fn decode_topic(bytes: &[u8]) -> Result<&str, StorageError> {
    std::str::from_utf8(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode_device(bytes: &[u8]) -> Result<DeviceId, StorageError> {
    DeviceId::try_from(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn record(byte: u8) -> StoredKey {
        StoredKey { sealed_key: vec![byte; 40], updated_at_secs: 1_700_000_000 }
    }

    #[test]
    fn topic_prefix_does_not_match_longer_names() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("keys.redb")).unwrap();
        let id = DeviceId::from_bytes([3; 16]);

        storage.store_device_key(&id, &record(1)).unwrap();
        storage.store_topic_key("a", &record(2)).unwrap();
        storage.store_topic_key("ab", &record(3)).unwrap();
        storage.link(&id, "ab").unwrap();

        assert_eq!(storage.devices_for_topic("a").unwrap(), Some(vec![]));
        assert_eq!(storage.devices_for_topic("ab").unwrap(), Some(vec![id]));
    }

    #[test]
    fn delete_topic_removes_both_grant_directions() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("keys.redb")).unwrap();
        let a = DeviceId::from_bytes([1; 16]);
        let b = DeviceId::from_bytes([2; 16]);

        storage.store_device_key(&a, &record(1)).unwrap();
        storage.store_device_key(&b, &record(2)).unwrap();
        storage.store_topic_key("x", &record(3)).unwrap();
        storage.store_topic_key("y", &record(4)).unwrap();
        for id in [&a, &b] {
            storage.link(id, "x").unwrap();
            storage.link(id, "y").unwrap();
        }

        assert!(storage.delete_topic("x").unwrap());
        assert_eq!(storage.topics_for_device(&a).unwrap(), Some(vec!["y".to_string()]));
        assert_eq!(storage.topics_for_device(&b).unwrap(), Some(vec!["y".to_string()]));
        assert_eq!(storage.devices_for_topic("x").unwrap(), None);
        assert!(!storage.delete_topic("x").unwrap());
    }

    #[test]
    fn record_survives_cbor_roundtrip() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("keys.redb")).unwrap();
        let id = DeviceId::from_bytes([7; 16]);

        storage.store_device_key(&id, &record(9)).unwrap();
        assert_eq!(storage.load_device_key(&id).unwrap(), Some(record(9)));
        assert_eq!(storage.list_devices().unwrap(), vec![id]);
    }
}
