//! Tessera wire protocol.
//!
//! Everything that crosses the transport between the key-custody server and a
//! device: device identities, the fixed binary command layout, and the
//! authenticated envelopes that wrap commands and application data.
//!
//! # Envelopes
//!
//! ```text
//! Command ──encode──► [tag: 1][fields] ──seal under root key──► control envelope
//! App data ───────────────────────────────seal under topic key──► app envelope
//!
//! envelope = [nonce: 24][ciphertext][tag: 16]
//! ```
//!
//! # Invariants
//!
//! - Each [`CommandType`] maps to exactly one tag byte and one field layout,
//!   enforced by exhaustive matches in `encode` and `decode`.
//! - Commands are never sent in the clear: [`seal_command`] is the only path
//!   from a [`Command`] to bytes that leave the server.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod command;
pub mod envelope;
mod error;
mod id;

pub use command::{Command, CommandType};
pub use envelope::{open_command, protect, seal_command, unprotect};
pub use error::ProtocolError;
pub use id::{DEVICE_ID_SIZE, DeviceId};
