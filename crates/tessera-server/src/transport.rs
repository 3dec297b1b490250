//! Publish/subscribe transport seam.
//!
//! The orchestrator only ever publishes: a sealed command on a device's control
//! topic, or a protected application message on a data topic. Session
//! management, reconnects and subscriptions belong to the bus client behind
//! this trait.

#![allow(clippy::disallowed_types, reason = "Synchronous recording transport")]

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;

/// Delivery guarantee requested for a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum QoS {
    /// Fire and forget (0)
    AtMostOnce = 0,
    /// Acknowledged, may duplicate (1)
    AtLeastOnce = 1,
    /// Acknowledged, delivered once (2)
    ExactlyOnce = 2,
}

impl QoS {
    /// Numeric level as used on the wire.
    pub const fn level(self) -> u8 {
        self as u8
    }
}

/// Transport failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The bus client is gone and will not accept more messages.
    #[error("transport closed")]
    Closed,

    /// The broker or client refused the publish.
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Publishes payloads to topics.
///
/// `publish` returns once the message is handed off; an `Ok` does not mean the
/// device received it.
pub trait Transport: Send + Sync + 'static {
    /// Publish `payload` on `topic`.
    fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), TransportError>;
}

/// A message handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Destination topic
    pub topic: String,
    /// Opaque payload (always an envelope)
    pub payload: Vec<u8>,
    /// Requested delivery guarantee
    pub qos: QoS,
}

/// Transport that records publishes in memory.
///
/// Used by tests and dry runs. Clones share the same record, and
/// [`set_failing`](Self::set_failing) makes every publish fail until reset.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<MemoryTransportInner>>,
}

#[derive(Default)]
struct MemoryTransportInner {
    published: Vec<Outbound>,
    failing: bool,
}

impl MemoryTransport {
    /// Create an empty, healthy transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent publishes fail (`true`) or succeed (`false`).
    #[allow(clippy::expect_used)]
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().expect("Mutex poisoned").failing = failing;
    }

    /// Every successful publish so far, in order.
    #[allow(clippy::expect_used)]
    pub fn published(&self) -> Vec<Outbound> {
        self.inner.lock().expect("Mutex poisoned").published.clone()
    }

    /// Drain the recorded publishes.
    #[allow(clippy::expect_used)]
    pub fn take_published(&self) -> Vec<Outbound> {
        std::mem::take(&mut self.inner.lock().expect("Mutex poisoned").published)
    }
}

impl Transport for MemoryTransport {
    #[allow(clippy::expect_used)]
    fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        if inner.failing {
            return Err(TransportError::Unavailable("publish refused".to_string()));
        }

        inner.published.push(Outbound { topic: topic.to_string(), payload: payload.to_vec(), qos });
        Ok(())
    }
}

/// Transport that forwards messages to a bus-client task over a channel.
///
/// The receiving task owns the broker connection. Once it drops the receiver,
/// publishes fail with [`TransportError::Closed`].
///
/// [`new`](Self::new) queues without limit, so a stalled bus client lets the
/// queue grow unbounded. [`bounded`](Self::bounded) caps it instead: a publish
/// into a full queue fails with [`TransportError::Unavailable`] and, for a
/// rotation, the old root key stays authoritative.
#[derive(Clone)]
pub struct ChannelTransport {
    sender: ChannelSender,
}

#[derive(Clone)]
enum ChannelSender {
    Unbounded(mpsc::UnboundedSender<Outbound>),
    Bounded(mpsc::Sender<Outbound>),
}

impl ChannelTransport {
    /// Create the transport and the receiver the bus client drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender: ChannelSender::Unbounded(sender) }, receiver)
    }

    /// Like [`new`](Self::new), but at most `capacity` messages wait for the
    /// bus client.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender: ChannelSender::Bounded(sender) }, receiver)
    }
}

impl Transport for ChannelTransport {
    fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), TransportError> {
        let message = Outbound { topic: topic.to_string(), payload: payload.to_vec(), qos };
        match &self.sender {
            ChannelSender::Unbounded(sender) => {
                sender.send(message).map_err(|_| TransportError::Closed)
            },
            ChannelSender::Bounded(sender) => sender.try_send(message).map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => {
                    TransportError::Unavailable("outbound queue full".to_string())
                },
                mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
            }),
        }
    }
}
