//! Tessera key-custody and command-distribution server.
//!
//! The server is the only party that knows every device's root key. It hands
//! out per-topic keys to devices by sealing commands under their root keys and
//! publishing them on a per-device control topic. It never sees or forwards
//! plaintext application traffic apart from messages it protects itself with
//! [`C2::publish_message`].
//!
//! # Components
//!
//! - [`KeyStore`]: keys sealed under a passphrase-derived KEK, over any
//!   [`Storage`] backend ([`RedbStorage`] on disk, [`MemoryStorage`] for
//!   tests, [`ChaoticStorage`] for fault injection)
//! - [`create_and_protect_for_id`]: builds a command and seals it for one
//!   device
//! - [`C2`]: the orchestrator tying store, [`Transport`] and [`Dispatcher`]
//!   together
//! - [`Dispatcher`]: synchronous fan-out of [`Event`]s to [`Listener`]s
//!
//! # Data flow
//!
//! ```text
//! admin intent ─► C2 ─► KeyStore ─► Storage (ciphertext only)
//!                  │
//!                  ├─► create_and_protect_for_id ─► Transport (control topic)
//!                  └─► Dispatcher ─► Listeners
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod c2;
pub mod clock;
mod config;
mod error;
pub mod events;
mod keystore;
mod locks;
mod protocol;
pub mod storage;
pub mod transport;

pub use c2::C2;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{C2Config, DEFAULT_CONTROL_PREFIX, DEFAULT_LOCK_STRIPES};
pub use error::{C2Error, Entity};
pub use events::{ChannelListener, Dispatcher, Event, EventKind, Listener};
pub use keystore::{KeyStore, validate_topic};
pub use protocol::create_and_protect_for_id;
pub use storage::{
    ChaoticStorage, MemoryStorage, RedbStorage, Storage, StorageError, StorageOp, StoredKey,
};
pub use transport::{ChannelTransport, MemoryTransport, Outbound, QoS, Transport, TransportError};
