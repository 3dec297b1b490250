//! Tessera Cryptographic Primitives
//!
//! Building blocks for key custody: authenticated encryption of key records and
//! command envelopes, passphrase-based derivation of the key-encryption-key
//! (KEK), and deterministic topic hashing.
//!
//! # Key Hierarchy
//!
//! ```text
//! Passphrase
//!     │
//!     ▼ Argon2id (fixed salt, stable across restarts)
//! KEK ──────────────► XChaCha20-Poly1305 ──► stored root/topic key records
//!
//! Root Key (per device) ──► XChaCha20-Poly1305 ──► command envelopes
//! Topic Key (per topic) ──► XChaCha20-Poly1305 ──► application envelopes
//! ```
//!
//! # Security
//!
//! - Every ciphertext carries a 16-byte Poly1305 tag. A failed tag check is
//!   reported as [`CryptoError::Authentication`] and no plaintext is released.
//! - Nonces are 24 random bytes (`XChaCha20`), so random generation per
//!   message is safe without a counter.
//! - [`Key`] zeroizes its bytes on drop and never prints them.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod aead;
mod error;
pub mod hash;
pub mod kdf;
mod key;

pub use aead::{NONCE_SIZE, Nonce, TAG_SIZE, decrypt, encrypt, random_nonce};
pub use error::CryptoError;
pub use hash::{TOPIC_HASH_SIZE, TopicHash, hash_id_alias, hash_topic};
pub use kdf::{KdfParams, derive_kek, derive_kek_with_params};
pub use key::{KEY_SIZE, Key, random_key};
