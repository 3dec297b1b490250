//! Deterministic hashing of topic names and device aliases

use std::fmt;

use sha2::{Digest, Sha256};

/// Size of a topic hash in bytes (128 bits)
pub const TOPIC_HASH_SIZE: usize = 16;

/// Truncated SHA-256 of a topic name.
///
/// Commands carry this instead of the topic string so the name and its length
/// never appear on the control channel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicHash([u8; TOPIC_HASH_SIZE]);

impl TopicHash {
    /// Wrap raw hash bytes (e.g. when decoding a command).
    pub fn from_bytes(bytes: [u8; TOPIC_HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; TOPIC_HASH_SIZE] {
        &self.0
    }
}

impl fmt::Display for TopicHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for TopicHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TopicHash({self})")
    }
}

/// Hash a topic name. Same name always yields the same digest.
pub fn hash_topic(name: &str) -> TopicHash {
    TopicHash(truncated_sha256(name.as_bytes()))
}

/// Hash a human-readable device alias into 16 identity bytes.
pub fn hash_id_alias(alias: &str) -> [u8; 16] {
    truncated_sha256(alias.as_bytes())
}

fn truncated_sha256(data: &[u8]) -> [u8; 16] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}
