//! Orchestrator configuration.

use tessera_crypto::KdfParams;
use tessera_proto::DeviceId;

/// Prefix of per-device control topics.
pub const DEFAULT_CONTROL_PREFIX: &str = "e4";

/// Number of stripes in each entity lock table.
pub const DEFAULT_LOCK_STRIPES: usize = 64;

/// Configuration for [`C2`](crate::C2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct C2Config {
    /// Control topics are `<control_prefix>/<hex device id>`.
    pub control_prefix: String,
    /// Argon2id cost used when deriving the KEK from a passphrase.
    pub kdf: KdfParams,
    /// Stripes per entity lock table. More stripes means fewer unrelated
    /// devices or topics contending on the same lock.
    pub lock_stripes: usize,
}

impl C2Config {
    /// Control topic for a device.
    pub fn control_topic(&self, id: &DeviceId) -> String {
        format!("{}/{}", self.control_prefix, id)
    }
}

impl Default for C2Config {
    fn default() -> Self {
        Self {
            control_prefix: DEFAULT_CONTROL_PREFIX.to_string(),
            kdf: KdfParams::default(),
            lock_stripes: DEFAULT_LOCK_STRIPES,
        }
    }
}
