//! Key store contract tests, run against every storage backend.

use tempfile::tempdir;
use tessera_crypto::{KEY_SIZE, Key};
use tessera_proto::DeviceId;
use tessera_server::{C2Error, Entity, KeyStore, MemoryStorage, RedbStorage, Storage};

fn kek() -> Key {
    Key::from_bytes([0x42; 32])
}

fn device(n: u8) -> DeviceId {
    DeviceId::from_bytes([n; 16])
}

fn with_memory(check: impl FnOnce(KeyStore<MemoryStorage>)) {
    check(KeyStore::new(MemoryStorage::new(), kek()));
}

fn with_redb(check: impl FnOnce(KeyStore<RedbStorage>)) {
    let dir = tempdir().unwrap();
    let storage = RedbStorage::open(dir.path().join("keys.redb")).unwrap();
    check(KeyStore::new(storage, kek()));
}

fn id_key_roundtrip<S: Storage>(store: KeyStore<S>) {
    let id = device(1);
    let key = Key::from_bytes([7; 32]);

    store.insert_id_key(&id, &key).unwrap();
    assert_eq!(store.get_id_key(&id).unwrap(), key);

    let replacement = Key::from_bytes([8; 32]);
    store.insert_id_key(&id, &replacement).unwrap();
    assert_eq!(store.get_id_key(&id).unwrap(), replacement);
    assert_eq!(store.count_ids().unwrap(), 1);
}

fn missing_entries_are_not_found<S: Storage>(store: KeyStore<S>) {
    let id = device(2);
    assert_eq!(store.get_id_key(&id), Err(C2Error::NotFound(Entity::Device(id))));
    assert_eq!(store.delete_id_key(&id), Err(C2Error::NotFound(Entity::Device(id))));
    assert_eq!(store.get_topic_key("t"), Err(C2Error::NotFound(Entity::topic("t"))));
    assert_eq!(store.delete_topic_key("t"), Err(C2Error::NotFound(Entity::topic("t"))));
    assert_eq!(store.topics_for_id(&id), Err(C2Error::NotFound(Entity::Device(id))));
    assert_eq!(store.ids_for_topic("t"), Err(C2Error::NotFound(Entity::topic("t"))));
}

fn link_requires_endpoints_and_is_idempotent<S: Storage>(store: KeyStore<S>) {
    let id = device(3);
    let key = Key::from_bytes([1; 32]);

    assert!(store.link_id_topic(&id, "t").unwrap_err().is_not_found());
    store.insert_id_key(&id, &key).unwrap();
    assert_eq!(store.link_id_topic(&id, "t"), Err(C2Error::NotFound(Entity::topic("t"))));

    store.insert_topic_key("t", &key).unwrap();
    assert_eq!(store.link_id_topic(&id, "t"), Ok(true));
    assert_eq!(store.link_id_topic(&id, "t"), Ok(false));
    assert_eq!(store.topics_for_id(&id).unwrap(), vec!["t".to_string()]);
    assert_eq!(store.ids_for_topic("t").unwrap(), vec![id]);

    assert!(store.unlink_id_topic(&id, "t").unwrap());
    assert!(!store.unlink_id_topic(&id, "t").unwrap());
    assert!(store.topics_for_id(&id).unwrap().is_empty());
}

fn deleting_device_cascades<S: Storage>(store: KeyStore<S>) {
    let (a, b) = (device(4), device(5));
    let key = Key::from_bytes([1; 32]);
    store.insert_id_key(&a, &key).unwrap();
    store.insert_id_key(&b, &key).unwrap();
    store.insert_topic_key("t", &key).unwrap();
    store.insert_topic_key("u", &key).unwrap();
    for id in [&a, &b] {
        store.link_id_topic(id, "t").unwrap();
        store.link_id_topic(id, "u").unwrap();
    }

    store.delete_id_key(&a).unwrap();

    assert_eq!(store.ids_for_topic("t").unwrap(), vec![b]);
    assert_eq!(store.ids_for_topic("u").unwrap(), vec![b]);
    assert_eq!(store.list_ids().unwrap(), vec![b]);
}

fn deleting_topic_cascades<S: Storage>(store: KeyStore<S>) {
    let id = device(6);
    let key = Key::from_bytes([1; 32]);
    store.insert_id_key(&id, &key).unwrap();
    store.insert_topic_key("t", &key).unwrap();
    store.insert_topic_key("u", &key).unwrap();
    store.link_id_topic(&id, "t").unwrap();
    store.link_id_topic(&id, "u").unwrap();

    store.delete_topic_key("t").unwrap();

    assert_eq!(store.topics_for_id(&id).unwrap(), vec!["u".to_string()]);
    assert_eq!(store.list_topics().unwrap(), vec!["u".to_string()]);
    assert_eq!(store.count_topics().unwrap(), 1);
    assert!(store.get_topic_key("t").unwrap_err().is_not_found());
}

fn backend_holds_only_ciphertext<S: Storage>(store: KeyStore<S>) {
    let id = device(7);
    let key = Key::from_bytes([0x5a; 32]);
    store.insert_id_key(&id, &key).unwrap();
    store.insert_topic_key("t", &key).unwrap();

    for record in [
        store.storage().load_device_key(&id).unwrap().unwrap(),
        store.storage().load_topic_key("t").unwrap().unwrap(),
    ] {
        assert!(record.sealed_key.len() > KEY_SIZE);
        assert!(!record.sealed_key.windows(KEY_SIZE).any(|w| w == key.as_bytes()));
    }
}

macro_rules! both_backends {
    ($($name:ident),* $(,)?) => {
        mod memory {
            use super::*;
            $(#[test] fn $name() { with_memory(super::$name); })*
        }
        mod redb {
            use super::*;
            $(#[test] fn $name() { with_redb(super::$name); })*
        }
    };
}

both_backends!(
    id_key_roundtrip,
    missing_entries_are_not_found,
    link_requires_endpoints_and_is_idempotent,
    deleting_device_cascades,
    deleting_topic_cascades,
    backend_holds_only_ciphertext,
);

#[test]
fn tampered_record_is_corrupted_not_missing() {
    let storage = MemoryStorage::new();
    let store = KeyStore::new(storage.clone(), kek());
    let id = device(8);
    store.insert_id_key(&id, &Key::from_bytes([3; 32])).unwrap();
    store.insert_topic_key("t", &Key::from_bytes([4; 32])).unwrap();

    assert!(storage.tamper_device_key(&id, |bytes| bytes[30] ^= 0x01));
    assert!(storage.tamper_topic_key("t", |bytes| bytes.truncate(10)));

    assert_eq!(store.get_id_key(&id), Err(C2Error::CorruptedData(Entity::Device(id))));
    assert_eq!(store.get_topic_key("t"), Err(C2Error::CorruptedData(Entity::topic("t"))));
}
