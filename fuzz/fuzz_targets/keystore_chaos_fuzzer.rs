//! Fuzz target for the orchestrator under storage failures
//!
//! Drives `C2` over `ChaoticStorage` with arbitrary operation sequences and
//! failure rates.
//!
//! # Invariants
//!
//! - Storage errors propagate as `Err`, never as panics
//! - No grant references a missing device or topic afterwards
//! - Every stored key still authenticates under the KEK

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tessera_crypto::{KdfParams, Key};
use tessera_proto::DeviceId;
use tessera_server::{
    C2, C2Config, ChaoticStorage, KeyStore, MemoryStorage, MemoryTransport,
};

#[derive(Debug, Clone, Arbitrary)]
struct ChaosScenario {
    /// Seed for ChaoticStorage RNG (deterministic failures)
    chaos_seed: u64,
    /// Failure rate 0-9 maps to 0%-90%
    failure_rate_tenth: u8,
    operations: Vec<Operation>,
}

#[derive(Debug, Clone, Arbitrary)]
enum Operation {
    Enroll { device: u8, key: u8 },
    RemoveDevice { device: u8 },
    CreateTopic { topic: u8 },
    RemoveTopic { topic: u8 },
    Link { device: u8, topic: u8 },
    Unlink { device: u8, topic: u8 },
    Grant { device: u8, topic: u8 },
    Rotate { device: u8 },
    TransportDown(bool),
}

fn device(n: u8) -> DeviceId {
    DeviceId::from_bytes([n % 8; 16])
}

fn topic(n: u8) -> String {
    format!("topic/{}", n % 4)
}

fuzz_target!(|scenario: ChaosScenario| {
    let failure_rate = f64::from(scenario.failure_rate_tenth % 10) / 10.0;
    let kek = Key::from_bytes([0x42; 32]);
    let inner = MemoryStorage::new();
    let storage = ChaoticStorage::with_seed(inner.clone(), failure_rate, scenario.chaos_seed);
    let config = C2Config { kdf: KdfParams::new(1024, 1, 1), ..C2Config::default() };
    let c2 = C2::new(KeyStore::new(storage, kek.clone()), MemoryTransport::new(), config);

    for operation in scenario.operations {
        let _ = match operation {
            Operation::Enroll { device: d, key } => {
                c2.enroll_device(&device(d), &Key::from_bytes([key; 32]))
            },
            Operation::RemoveDevice { device: d } => c2.remove_device(&device(d)),
            Operation::CreateTopic { topic: t } => c2.create_topic(&topic(t)),
            Operation::RemoveTopic { topic: t } => c2.remove_topic(&topic(t)),
            Operation::Link { device: d, topic: t } => {
                c2.link_device_topic(&device(d), &topic(t)).map(|_| ())
            },
            Operation::Unlink { device: d, topic: t } => {
                c2.unlink_device_topic(&device(d), &topic(t)).map(|_| ())
            },
            Operation::Grant { device: d, topic: t } => c2.grant_topic(&device(d), &topic(t)),
            Operation::Rotate { device: d } => c2.rotate_root_key(&device(d)),
            Operation::TransportDown(down) => {
                c2.transport().set_failing(down);
                Ok(())
            },
        };
    }

    let clean = KeyStore::new(inner, kek);
    let topics = clean.list_topics().expect("list_topics");
    for id in clean.list_ids().expect("list_ids") {
        clean.get_id_key(&id).expect("device key authenticates");
        for granted in clean.topics_for_id(&id).expect("topics_for_id") {
            assert!(topics.contains(&granted), "dangling grant {id} -> {granted}");
        }
    }
    for name in &topics {
        clean.get_topic_key(name).expect("topic key authenticates");
    }
});
