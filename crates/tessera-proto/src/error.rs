//! Protocol error types.

use tessera_crypto::CryptoError;
use thiserror::Error;

use crate::CommandType;

/// Errors from identity parsing, command encoding/decoding, and envelopes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Identity bytes with the wrong length
    #[error("invalid device id length: expected {expected}, got {actual}")]
    InvalidIdLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Identity text that is not valid hex
    #[error("invalid device id encoding: {0}")]
    InvalidIdEncoding(String),

    /// Command tag byte not recognised
    #[error("unknown command tag: {0:#04x}")]
    UnknownCommand(u8),

    /// Command payload length does not match its type's layout
    #[error("invalid {command:?} payload: expected {expected} bytes, got {actual}")]
    InvalidCommandLength {
        /// Command type from the tag byte
        command: CommandType,
        /// Expected total length, tag included
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Empty command payload (no tag byte)
    #[error("empty command payload")]
    EmptyCommand,

    /// A field required by the command type was not supplied
    #[error("{command:?} requires a {field}")]
    MissingField {
        /// Command type being built
        command: CommandType,
        /// Name of the missing field
        field: &'static str,
    },

    /// Envelope sealing or opening failed
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}
