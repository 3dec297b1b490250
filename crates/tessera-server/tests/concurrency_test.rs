//! Concurrent orchestrator use from many threads.

use std::{collections::BTreeSet, sync::Arc, thread};

use tempfile::tempdir;
use tessera_crypto::{KdfParams, Key, hash_topic};
use tessera_proto::{Command, DeviceId, open_command};
use tessera_server::{C2, C2Config, KeyStore, MemoryStorage, MemoryTransport, RedbStorage, Storage};

fn config() -> C2Config {
    C2Config { kdf: KdfParams::new(1024, 1, 1), lock_stripes: 8, ..C2Config::default() }
}

fn grant_many_topics_to_one_device<S: Storage>(storage: S) {
    let c2 = Arc::new(C2::new(
        KeyStore::new(storage, Key::from_bytes([0x42; 32])),
        MemoryTransport::new(),
        config(),
    ));
    let id = DeviceId::from_alias("shared-device");
    let root = Key::from_bytes([0x11; 32]);
    c2.enroll_device(&id, &root).unwrap();

    let topics: Vec<String> = (0..16).map(|i| format!("topic/{i}")).collect();
    for topic in &topics {
        c2.create_topic(topic).unwrap();
    }

    thread::scope(|scope| {
        for topic in &topics {
            let c2 = Arc::clone(&c2);
            scope.spawn(move || {
                c2.grant_topic(&id, topic).unwrap();
                c2.link_device_topic(&id, topic).unwrap();
            });
        }
    });

    // Every grant went out exactly once and opens under the one root key
    let granted: BTreeSet<_> = c2
        .transport()
        .published()
        .iter()
        .map(|message| match open_command(&message.payload, &root).unwrap() {
            Command::SetTopicKey { topic_hash, .. } => topic_hash,
            other => panic!("unexpected command {other:?}"),
        })
        .collect();
    let expected: BTreeSet<_> = topics.iter().map(|topic| hash_topic(topic)).collect();
    assert_eq!(granted, expected);

    let mut linked = c2.device_topics(&id).unwrap();
    linked.sort();
    let mut sorted_topics = topics.clone();
    sorted_topics.sort();
    assert_eq!(linked, sorted_topics);
}

#[test]
fn concurrent_grants_memory() {
    grant_many_topics_to_one_device(MemoryStorage::new());
}

#[test]
fn concurrent_grants_redb() {
    let dir = tempdir().unwrap();
    grant_many_topics_to_one_device(RedbStorage::open(dir.path().join("keys.redb")).unwrap());
}

#[test]
fn rotations_on_one_device_serialize() {
    let c2 = Arc::new(C2::new(
        KeyStore::new(MemoryStorage::new(), Key::from_bytes([0x42; 32])),
        MemoryTransport::new(),
        config(),
    ));
    let id = DeviceId::from_alias("rotating");
    let first_root = Key::from_bytes([0x22; 32]);
    c2.enroll_device(&id, &first_root).unwrap();

    thread::scope(|scope| {
        for _ in 0..8 {
            let c2 = Arc::clone(&c2);
            scope.spawn(move || c2.rotate_root_key(&id).unwrap());
        }
    });

    // A device applying the commands in publish order can follow every
    // rotation: each is sealed under the key set by the previous one.
    let mut current = first_root;
    for message in c2.transport().published() {
        match open_command(&message.payload, &current).unwrap() {
            Command::SetRootKey { key } => current = key,
            other => panic!("unexpected command {other:?}"),
        }
    }
    assert_eq!(c2.store().get_id_key(&id).unwrap(), current);
}

#[test]
fn distinct_devices_proceed_independently() {
    let c2 = Arc::new(C2::new(
        KeyStore::new(MemoryStorage::new(), Key::from_bytes([0x42; 32])),
        MemoryTransport::new(),
        config(),
    ));
    c2.create_topic("fleet").unwrap();

    thread::scope(|scope| {
        for n in 0..32u8 {
            let c2 = Arc::clone(&c2);
            scope.spawn(move || {
                let id = DeviceId::from_bytes([n; 16]);
                c2.enroll_device(&id, &Key::from_bytes([n; 32])).unwrap();
                c2.link_device_topic(&id, "fleet").unwrap();
                c2.grant_topic(&id, "fleet").unwrap();
            });
        }
    });

    assert_eq!(c2.device_count().unwrap(), 32);
    assert_eq!(c2.topic_devices("fleet").unwrap().len(), 32);
    assert_eq!(c2.transport().published().len(), 32);
}
