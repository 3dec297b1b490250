//! Chaotic storage wrapper for fault injection testing
//!
//! Randomly fails operations before they reach the wrapped backend, so an
//! injected failure never leaves a partial write behind. Chaos tests use it to
//! check that key store and orchestrator errors leave state consistent.
//!
//! Failures can be confined to one [`StorageOp`], e.g. only the root key write
//! that commits a rotation, to reach a specific step of an orchestrator
//! operation.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{Arc, Mutex};

use tessera_proto::DeviceId;

use super::{Storage, StorageError, StoredKey};

/// Chaotic storage wrapper that randomly injects failures
///
/// Delegates to an underlying storage implementation but randomly fails
/// operations based on a configured failure rate. Arc<Mutex<>> around the RNG
/// keeps clones sharing one deterministic failure sequence.
#[derive(Clone)]
pub struct ChaoticStorage<S: Storage> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// Only this operation may fail, if set
    target: Option<StorageOp>,
    rng: Arc<Mutex<ChaoticRng>>,
    operation_count: Arc<Mutex<usize>>,
}

/// A [`Storage`] method, for targeted fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageOp {
    /// [`Storage::store_device_key`]
    StoreDeviceKey,
    /// [`Storage::load_device_key`]
    LoadDeviceKey,
    /// [`Storage::delete_device`]
    DeleteDevice,
    /// [`Storage::store_topic_key`]
    StoreTopicKey,
    /// [`Storage::load_topic_key`]
    LoadTopicKey,
    /// [`Storage::delete_topic`]
    DeleteTopic,
    /// [`Storage::link`]
    Link,
    /// [`Storage::unlink`]
    Unlink,
    /// [`Storage::topics_for_device`]
    TopicsForDevice,
    /// [`Storage::devices_for_topic`]
    DevicesForTopic,
    /// [`Storage::list_devices`]
    ListDevices,
    /// [`Storage::list_topics`]
    ListTopics,
}

/// Linear congruential generator, reproducible from a seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // Numerical Recipes constants
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S: Storage> ChaoticStorage<S> {
    /// Wrap `inner` with the default seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Wrap `inner` with an explicit seed for reproducible chaos.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            target: None,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Confine failures to `op`; every other operation passes through.
    #[must_use]
    pub fn failing_only(mut self, op: StorageOp) -> Self {
        self.target = Some(op);
        self
    }

    /// Underlying storage (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of storage operations attempted, failed ones included.
    pub fn operation_count(&self) -> usize {
        #[allow(clippy::expect_used)]
        *self.operation_count.lock().expect("operation_count mutex poisoned")
    }

    /// Count the operation and decide whether it fails.
    #[allow(clippy::expect_used)]
    fn inject(&self, op: StorageOp) -> Result<(), StorageError> {
        *self.operation_count.lock().expect("operation_count mutex poisoned") += 1;

        if self.target.is_some_and(|target| target != op) {
            return Ok(());
        }

        let roll = self.rng.lock().expect("ChaoticRng mutex poisoned").next();
        if roll < self.failure_rate {
            return Err(StorageError::Io(format!("chaotic failure injection in {op:?}")));
        }
        Ok(())
    }
}

impl<S: Storage> Storage for ChaoticStorage<S> {
    fn store_device_key(&self, id: &DeviceId, key: &StoredKey) -> Result<(), StorageError> {
        self.inject(StorageOp::StoreDeviceKey)?;
        self.inner.store_device_key(id, key)
    }

    fn load_device_key(&self, id: &DeviceId) -> Result<Option<StoredKey>, StorageError> {
        self.inject(StorageOp::LoadDeviceKey)?;
        self.inner.load_device_key(id)
    }

    fn delete_device(&self, id: &DeviceId) -> Result<bool, StorageError> {
        self.inject(StorageOp::DeleteDevice)?;
        self.inner.delete_device(id)
    }

    fn store_topic_key(&self, topic: &str, key: &StoredKey) -> Result<(), StorageError> {
        self.inject(StorageOp::StoreTopicKey)?;
        self.inner.store_topic_key(topic, key)
    }

    fn load_topic_key(&self, topic: &str) -> Result<Option<StoredKey>, StorageError> {
        self.inject(StorageOp::LoadTopicKey)?;
        self.inner.load_topic_key(topic)
    }

    fn delete_topic(&self, topic: &str) -> Result<bool, StorageError> {
        self.inject(StorageOp::DeleteTopic)?;
        self.inner.delete_topic(topic)
    }

    fn link(&self, id: &DeviceId, topic: &str) -> Result<bool, StorageError> {
        self.inject(StorageOp::Link)?;
        self.inner.link(id, topic)
    }

    fn unlink(&self, id: &DeviceId, topic: &str) -> Result<bool, StorageError> {
        self.inject(StorageOp::Unlink)?;
        self.inner.unlink(id, topic)
    }

    fn topics_for_device(&self, id: &DeviceId) -> Result<Option<Vec<String>>, StorageError> {
        self.inject(StorageOp::TopicsForDevice)?;
        self.inner.topics_for_device(id)
    }

    fn devices_for_topic(&self, topic: &str) -> Result<Option<Vec<DeviceId>>, StorageError> {
        self.inject(StorageOp::DevicesForTopic)?;
        self.inner.devices_for_topic(topic)
    }

    fn list_devices(&self) -> Result<Vec<DeviceId>, StorageError> {
        self.inject(StorageOp::ListDevices)?;
        self.inner.list_devices()
    }

    fn list_topics(&self) -> Result<Vec<String>, StorageError> {
        self.inject(StorageOp::ListTopics)?;
        self.inner.list_topics()
    }
}
