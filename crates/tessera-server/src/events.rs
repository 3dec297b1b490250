//! Event fan-out to internal subsystems.
//!
//! Every successful orchestrator operation produces one [`Event`], which the
//! [`Dispatcher`] hands to each registered [`Listener`] in registration order.
//! Delivery is synchronous and under a read lock: listeners must not block,
//! and must do their own buffering (see [`ChannelListener`]).
//!
//! The read lock is taken recursively, so a listener may call back into the
//! orchestrator (and so into [`Dispatcher::dispatch`]) even while another
//! thread waits to register a listener.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use tessera_proto::DeviceId;
use tokio::sync::mpsc;

use crate::C2Error;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A device root key was stored
    DeviceEnrolled,
    /// A device and its grants were deleted
    DeviceRemoved,
    /// A topic key was sent to a device
    TopicGranted,
    /// A device was told to forget a topic
    TopicRevoked,
    /// A device was told to forget all topics
    DeviceReset,
    /// A topic key was generated and stored
    TopicCreated,
    /// A topic and its grants were deleted
    TopicRemoved,
    /// An application message was protected and published
    MessagePublished,
    /// A device root key was replaced
    RootKeyRotated,
    /// A grant was recorded
    GrantLinked,
    /// A grant was removed
    GrantUnlinked,
}

/// A state change, as seen by listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// What happened
    pub kind: EventKind,
    /// Device involved, if any
    #[serde(serialize_with = "serialize_device")]
    pub device: Option<DeviceId>,
    /// Topic involved, if any
    pub topic: Option<String>,
    /// Unix seconds at which the operation completed
    pub timestamp: u64,
}

impl Event {
    /// Event without a device or topic.
    pub fn new(kind: EventKind, timestamp: u64) -> Self {
        Self { kind, device: None, topic: None, timestamp }
    }

    /// Attach the device involved.
    #[must_use]
    pub fn with_device(mut self, id: DeviceId) -> Self {
        self.device = Some(id);
        self
    }

    /// Attach the topic involved.
    #[must_use]
    pub fn with_topic(mut self, topic: &str) -> Self {
        self.topic = Some(topic.to_string());
        self
    }
}

fn serialize_device<S: Serializer>(
    id: &Option<DeviceId>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match id {
        Some(id) => serializer.serialize_some(&id.to_hex()),
        None => serializer.serialize_none(),
    }
}

/// Receives events from the [`Dispatcher`].
pub trait Listener: Send + Sync {
    /// Handle one event. Must return promptly.
    fn send(&self, event: &Event);
}

/// Registry of listeners.
///
/// Registration and removal take the write lock; dispatch and snapshots take
/// the read lock, so concurrent dispatches proceed in parallel. Registering
/// from inside [`Listener::send`] deadlocks.
#[derive(Default)]
pub struct Dispatcher {
    listeners: RwLock<Vec<Arc<dyn Listener>>>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. The same listener may be registered twice and then
    /// receives every event twice.
    pub fn add_listener(&self, listener: Arc<dyn Listener>) {
        self.listeners.write().push(listener);
    }

    /// Remove the earliest registration of `listener` (compared by pointer).
    ///
    /// # Errors
    ///
    /// - `ListenerNotFound` if it is not registered
    pub fn remove_listener(&self, listener: &Arc<dyn Listener>) -> Result<(), C2Error> {
        let mut listeners = self.listeners.write();
        let target = Arc::as_ptr(listener);
        let position = listeners
            .iter()
            .position(|registered| std::ptr::addr_eq(Arc::as_ptr(registered), target))
            .ok_or(C2Error::ListenerNotFound)?;
        listeners.remove(position);
        Ok(())
    }

    /// Snapshot of the registered listeners, in registration order.
    pub fn listeners(&self) -> Vec<Arc<dyn Listener>> {
        self.listeners.read().clone()
    }

    /// Deliver `event` to every listener, in registration order.
    ///
    /// Re-entrant: a listener may trigger further dispatches.
    pub fn dispatch(&self, event: &Event) {
        let listeners = self.listeners.read_recursive();
        tracing::trace!(kind = ?event.kind, listeners = listeners.len(), "dispatching event");
        for listener in listeners.iter() {
            listener.send(event);
        }
    }
}

/// Listener that queues events on an unbounded channel.
///
/// Never blocks the dispatcher. Events sent after the receiver is dropped are
/// discarded. The queue has no limit: a consumer that stops draining it lets
/// memory grow with every dispatched event.
pub struct ChannelListener {
    sender: mpsc::UnboundedSender<Event>,
}

impl ChannelListener {
    /// Create the listener and its receiving end.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Listener for ChannelListener {
    fn send(&self, event: &Event) {
        if self.sender.send(event.clone()).is_err() {
            tracing::debug!(kind = ?event.kind, "event receiver dropped, discarding");
        }
    }
}
