//! Error types for cryptographic operations

use thiserror::Error;

/// Errors from cryptographic primitives
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Authentication tag mismatch, truncated input, or wrong key.
    ///
    /// Never accompanied by partial plaintext.
    #[error("authentication failed")]
    Authentication,

    /// Key material or identifier with the wrong length
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length in bytes
        expected: usize,
        /// Actual length in bytes
        actual: usize,
    },

    /// Input rejected before any cryptographic work was done
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Argon2 rejected the parameters or failed to run
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// The OS random number generator failed
    #[error("entropy source failed: {0}")]
    Entropy(String),
}

impl CryptoError {
    /// Returns true if this error indicates tampered or corrupted ciphertext.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication)
    }
}
