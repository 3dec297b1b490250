//! Persistence tests for `RedbStorage` behind the key store.
//!
//! Data must survive close/reopen cycles, and stay readable only with the
//! passphrase it was written under.

use tempfile::tempdir;
use tessera_crypto::{KdfParams, Key};
use tessera_proto::DeviceId;
use tessera_server::{C2Error, Entity, KeyStore, RedbStorage};

const FAST: KdfParams = KdfParams::new(1024, 1, 1);

#[test]
fn keys_and_grants_survive_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("keys.redb");
    let ids: Vec<DeviceId> = (0..5u8).map(|n| DeviceId::from_bytes([n; 16])).collect();

    {
        let store = KeyStore::open(RedbStorage::open(&db_path).unwrap(), "pw", &FAST).unwrap();
        store.insert_topic_key("shared", &Key::from_bytes([0xAA; 32])).unwrap();
        for (n, id) in ids.iter().enumerate() {
            store.insert_id_key(id, &Key::from_bytes([n as u8; 32])).unwrap();
            store.link_id_topic(id, "shared").unwrap();
        }
        // Database dropped
    }

    {
        let store = KeyStore::open(RedbStorage::open(&db_path).unwrap(), "pw", &FAST).unwrap();
        assert_eq!(store.list_ids().unwrap(), ids);
        for (n, id) in ids.iter().enumerate() {
            assert_eq!(store.get_id_key(id).unwrap(), Key::from_bytes([n as u8; 32]));
        }
        assert_eq!(store.get_topic_key("shared").unwrap(), Key::from_bytes([0xAA; 32]));
        assert_eq!(store.ids_for_topic("shared").unwrap(), ids);
    }
}

#[test]
fn cascade_is_durable() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("keys.redb");
    let id = DeviceId::from_alias("sensor-1");

    {
        let store = KeyStore::open(RedbStorage::open(&db_path).unwrap(), "pw", &FAST).unwrap();
        store.insert_id_key(&id, &Key::from_bytes([1; 32])).unwrap();
        store.insert_topic_key("t", &Key::from_bytes([2; 32])).unwrap();
        store.link_id_topic(&id, "t").unwrap();
        store.delete_topic_key("t").unwrap();
    }

    {
        let store = KeyStore::open(RedbStorage::open(&db_path).unwrap(), "pw", &FAST).unwrap();
        assert!(store.topics_for_id(&id).unwrap().is_empty());
        assert!(store.list_topics().unwrap().is_empty());
    }
}

#[test]
fn wrong_passphrase_after_restart_is_corrupted_data() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("keys.redb");
    let id = DeviceId::from_alias("sensor-2");

    {
        let store = KeyStore::open(RedbStorage::open(&db_path).unwrap(), "right", &FAST).unwrap();
        store.insert_id_key(&id, &Key::from_bytes([3; 32])).unwrap();
    }

    let store = KeyStore::open(RedbStorage::open(&db_path).unwrap(), "wrong", &FAST).unwrap();
    assert_eq!(store.get_id_key(&id), Err(C2Error::CorruptedData(Entity::Device(id))));
}
