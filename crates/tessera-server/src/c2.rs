//! Distribution orchestrator.
//!
//! [`C2`] turns administrative intents (enroll, grant, rotate, ...) into key
//! store updates and sealed commands on a device's control topic, then
//! announces each success on the [`Dispatcher`].
//!
//! # Ordering
//!
//! Operations touching the same device or topic are serialized through
//! striped locks (device stripe first, then topic stripe). Listeners run after
//! the locks are released.
//!
//! # Failure model
//!
//! Nothing is retried or rolled back. An operation that fails leaves the store
//! as the failing step found it; in particular a root key rotation only
//! commits the new key after the transport accepted the command carrying it.

use tessera_crypto::{Key, hash_topic, random_key};
use tessera_proto::{CommandType, DeviceId, protect};

use crate::{
    C2Config, C2Error,
    events::{Dispatcher, Event, EventKind},
    keystore::{KeyStore, validate_topic},
    locks::LockTable,
    protocol::create_and_protect_for_id,
    storage::Storage,
    transport::{QoS, Transport},
};

/// Key-custody and command-distribution service.
pub struct C2<S: Storage, T: Transport> {
    store: KeyStore<S>,
    transport: T,
    dispatcher: Dispatcher,
    config: C2Config,
    device_locks: LockTable,
    topic_locks: LockTable,
}

impl<S: Storage, T: Transport> C2<S, T> {
    /// Assemble the service from an opened key store.
    pub fn new(store: KeyStore<S>, transport: T, config: C2Config) -> Self {
        let device_locks = LockTable::new(config.lock_stripes);
        let topic_locks = LockTable::new(config.lock_stripes);
        Self { store, transport, dispatcher: Dispatcher::new(), config, device_locks, topic_locks }
    }

    /// Derive the KEK from `passphrase` (with `config.kdf`) and assemble the
    /// service.
    pub fn open(
        storage: S,
        passphrase: &str,
        transport: T,
        config: C2Config,
    ) -> Result<Self, C2Error> {
        let store = KeyStore::open(storage, passphrase, &config.kdf)?;
        Ok(Self::new(store, transport, config))
    }

    /// The encrypted key store.
    pub fn store(&self) -> &KeyStore<S> {
        &self.store
    }

    /// The transport commands are published on.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Event registry.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Active configuration.
    pub fn config(&self) -> &C2Config {
        &self.config
    }

    /// Store a new device's root key. Nothing is sent.
    pub fn enroll_device(&self, id: &DeviceId, key: &Key) -> Result<(), C2Error> {
        let result = self.with_device(id, || self.store.insert_id_key(id, key));
        self.complete(result, EventKind::DeviceEnrolled, Some(id), None)
    }

    /// Delete a device and its grants. Nothing is sent.
    pub fn remove_device(&self, id: &DeviceId) -> Result<(), C2Error> {
        let result = self.with_device(id, || self.store.delete_id_key(id));
        self.complete(result, EventKind::DeviceRemoved, Some(id), None)
    }

    /// Send a topic's key to a device.
    ///
    /// Grants are not recorded; use [`link_device_topic`](Self::link_device_topic)
    /// to track them.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the device or topic does not exist
    /// - `Transport` if the command could not be handed off
    pub fn grant_topic(&self, id: &DeviceId, topic: &str) -> Result<(), C2Error> {
        let result = self.with_device_and_topic(id, topic, || {
            let topic_key = self.store.get_topic_key(topic)?;
            let envelope = create_and_protect_for_id(
                &self.store,
                CommandType::SetTopicKey,
                Some(hash_topic(topic)),
                Some(&topic_key),
                id,
            )?;
            self.send_command_to_client(id, &envelope)
        });
        self.complete(result, EventKind::TopicGranted, Some(id), Some(topic))
    }

    /// Tell a device to forget a topic's key.
    ///
    /// The topic itself need not exist any more.
    pub fn revoke_topic(&self, id: &DeviceId, topic: &str) -> Result<(), C2Error> {
        validate_topic(topic)?;
        let result = self.with_device_and_topic(id, topic, || {
            let envelope = create_and_protect_for_id(
                &self.store,
                CommandType::RemoveTopic,
                Some(hash_topic(topic)),
                None,
                id,
            )?;
            self.send_command_to_client(id, &envelope)
        });
        self.complete(result, EventKind::TopicRevoked, Some(id), Some(topic))
    }

    /// Tell a device to forget every topic key.
    pub fn reset_device(&self, id: &DeviceId) -> Result<(), C2Error> {
        let result = self.with_device(id, || {
            let envelope =
                create_and_protect_for_id(&self.store, CommandType::ResetTopics, None, None, id)?;
            self.send_command_to_client(id, &envelope)
        });
        self.complete(result, EventKind::DeviceReset, Some(id), None)
    }

    /// Generate and store a fresh key for a topic, replacing any previous one.
    pub fn create_topic(&self, topic: &str) -> Result<(), C2Error> {
        validate_topic(topic)?;
        let result = self.with_topic(topic, || {
            let key = random_key()?;
            self.store.insert_topic_key(topic, &key)
        });
        self.complete(result, EventKind::TopicCreated, None, Some(topic))
    }

    /// Delete a topic and its grants. Nothing is sent.
    pub fn remove_topic(&self, topic: &str) -> Result<(), C2Error> {
        validate_topic(topic)?;
        let result = self.with_topic(topic, || self.store.delete_topic_key(topic));
        self.complete(result, EventKind::TopicRemoved, None, Some(topic))
    }

    /// Protect `message` under the topic key and publish it on the topic
    /// (QoS 0).
    pub fn publish_message(&self, topic: &str, message: &[u8]) -> Result<(), C2Error> {
        validate_topic(topic)?;
        let result = self.with_topic(topic, || {
            let topic_key = self.store.get_topic_key(topic)?;
            let envelope = protect(message, &topic_key)?;
            self.transport.publish(topic, &envelope, QoS::AtMostOnce)?;
            Ok(())
        });
        self.complete(result, EventKind::MessagePublished, None, Some(topic))
    }

    /// Replace a device's root key.
    ///
    /// The new key travels sealed under the current key. It is stored only
    /// once the transport accepted the command, so on a send failure the old
    /// key stays authoritative on both sides.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the device is not enrolled
    /// - `Transport` if the command could not be handed off (store unchanged)
    pub fn rotate_root_key(&self, id: &DeviceId) -> Result<(), C2Error> {
        let result = self.with_device(id, || {
            let new_key = random_key()?;
            let envelope = create_and_protect_for_id(
                &self.store,
                CommandType::SetRootKey,
                None,
                Some(&new_key),
                id,
            )?;
            self.send_command_to_client(id, &envelope)?;
            self.store.insert_id_key(id, &new_key).inspect_err(|err| {
                tracing::error!(
                    device = %id,
                    error = %err,
                    "new root key was sent but could not be stored"
                );
            })
        });
        self.complete(result, EventKind::RootKeyRotated, Some(id), None)
    }

    /// Record a grant between an enrolled device and an existing topic.
    ///
    /// Returns `false` if the grant was already recorded; no event is emitted
    /// in that case.
    pub fn link_device_topic(&self, id: &DeviceId, topic: &str) -> Result<bool, C2Error> {
        let result =
            self.with_device_and_topic(id, topic, || self.store.link_id_topic(id, topic));
        self.complete_grant(result, EventKind::GrantLinked, id, topic)
    }

    /// Remove a recorded grant. Returns `false` (and emits no event) if there
    /// was none.
    pub fn unlink_device_topic(&self, id: &DeviceId, topic: &str) -> Result<bool, C2Error> {
        let result =
            self.with_device_and_topic(id, topic, || self.store.unlink_id_topic(id, topic));
        self.complete_grant(result, EventKind::GrantUnlinked, id, topic)
    }

    /// Topics recorded as granted to a device.
    pub fn device_topics(&self, id: &DeviceId) -> Result<Vec<String>, C2Error> {
        self.store.topics_for_id(id)
    }

    /// Devices recorded as granted a topic.
    pub fn topic_devices(&self, topic: &str) -> Result<Vec<DeviceId>, C2Error> {
        self.store.ids_for_topic(topic)
    }

    /// Every enrolled device.
    pub fn devices(&self) -> Result<Vec<DeviceId>, C2Error> {
        self.store.list_ids()
    }

    /// Every topic.
    pub fn topics(&self) -> Result<Vec<String>, C2Error> {
        self.store.list_topics()
    }

    /// Number of enrolled devices.
    pub fn device_count(&self) -> Result<usize, C2Error> {
        self.store.count_ids()
    }

    /// Number of topics.
    pub fn topic_count(&self) -> Result<usize, C2Error> {
        self.store.count_topics()
    }

    /// Publish a sealed command on the device's control topic (QoS 2).
    pub fn send_command_to_client(&self, id: &DeviceId, envelope: &[u8]) -> Result<(), C2Error> {
        let topic = self.config.control_topic(id);
        self.transport.publish(&topic, envelope, QoS::ExactlyOnce)?;
        tracing::debug!(device = %id, topic, bytes = envelope.len(), "command sent");
        Ok(())
    }

    fn with_device<R>(
        &self,
        id: &DeviceId,
        f: impl FnOnce() -> Result<R, C2Error>,
    ) -> Result<R, C2Error> {
        let _device = self.device_locks.lock(id.as_bytes());
        f()
    }

    fn with_topic<R>(
        &self,
        topic: &str,
        f: impl FnOnce() -> Result<R, C2Error>,
    ) -> Result<R, C2Error> {
        let _topic = self.topic_locks.lock(topic.as_bytes());
        f()
    }

    fn with_device_and_topic<R>(
        &self,
        id: &DeviceId,
        topic: &str,
        f: impl FnOnce() -> Result<R, C2Error>,
    ) -> Result<R, C2Error> {
        let _device = self.device_locks.lock(id.as_bytes());
        let _topic = self.topic_locks.lock(topic.as_bytes());
        f()
    }

    /// Like [`complete`](Self::complete), but only a grant change is announced.
    fn complete_grant(
        &self,
        result: Result<bool, C2Error>,
        kind: EventKind,
        id: &DeviceId,
        topic: &str,
    ) -> Result<bool, C2Error> {
        if result == Ok(false) {
            tracing::debug!(?kind, device = %id, topic, "grant unchanged");
            return Ok(false);
        }
        self.complete(result, kind, Some(id), Some(topic))
    }

    /// Log the outcome and, on success, dispatch the event.
    fn complete<R>(
        &self,
        result: Result<R, C2Error>,
        kind: EventKind,
        device: Option<&DeviceId>,
        topic: Option<&str>,
    ) -> Result<R, C2Error> {
        match result {
            Ok(value) => {
                tracing::info!(
                    ?kind,
                    device = device.map(tracing::field::display),
                    topic,
                    "operation succeeded"
                );

                let mut event = Event::new(kind, self.store.clock().now_secs());
                if let Some(id) = device {
                    event = event.with_device(*id);
                }
                if let Some(topic) = topic {
                    event = event.with_topic(topic);
                }
                self.dispatcher.dispatch(&event);
                Ok(value)
            },
            Err(err) => {
                tracing::warn!(
                    ?kind,
                    device = device.map(tracing::field::display),
                    topic,
                    error = %err,
                    "operation failed"
                );
                Err(err)
            },
        }
    }
}
