//! Argon2id derivation of the key-encryption-key (KEK)
//!
//! The KEK protects every root and topic key at rest. It must come out the same
//! on every start for the same passphrase, so the salt is a fixed,
//! crate-level constant rather than random per derivation.

use argon2::{Algorithm, Argon2, Params, Version};

use crate::{CryptoError, KEY_SIZE, Key};

/// Fixed salt for KEK derivation.
///
/// Changing this value makes every existing key store unreadable.
const KEK_SALT: &[u8] = b"tessera/kek/argon2id/v1";

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub time_cost: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

impl KdfParams {
    /// Custom cost parameters.
    pub const fn new(memory_kib: u32, time_cost: u32, parallelism: u32) -> Self {
        Self { memory_kib, time_cost, parallelism }
    }
}

impl Default for KdfParams {
    /// t=1, m=64 MiB, p=4
    fn default() -> Self {
        Self::new(64 * 1024, 1, 4)
    }
}

/// Derive the KEK from a passphrase with default cost parameters.
pub fn derive_kek(passphrase: &str) -> Result<Key, CryptoError> {
    derive_kek_with_params(passphrase, &KdfParams::default())
}

/// Derive the KEK from a passphrase with explicit cost parameters.
///
/// Deterministic: the same passphrase and parameters always produce the same
/// key.
///
/// # Errors
///
/// - `InvalidInput`: empty passphrase
/// - `KeyDerivation`: parameters rejected by Argon2
pub fn derive_kek_with_params(passphrase: &str, params: &KdfParams) -> Result<Key, CryptoError> {
    if passphrase.is_empty() {
        return Err(CryptoError::InvalidInput("passphrase must not be empty".to_string()));
    }

    let params = Params::new(params.memory_kib, params.time_cost, params.parallelism, Some(KEY_SIZE))
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut kek = Key::zeroed();
    argon2
        .hash_password_into(passphrase.as_bytes(), KEK_SALT, kek.as_mut_bytes())
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    Ok(kek)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1 MiB - fast for tests
    const FAST: KdfParams = KdfParams::new(1024, 1, 1);

    #[test]
    fn derive_is_deterministic() {
        let k1 = derive_kek_with_params("unittests", &FAST).unwrap();
        let k2 = derive_kek_with_params("unittests", &FAST).unwrap();
        assert_eq!(k1, k2, "same passphrase must produce same KEK");
    }

    #[test]
    fn different_passphrases_differ() {
        let k1 = derive_kek_with_params("passphrase-one", &FAST).unwrap();
        let k2 = derive_kek_with_params("passphrase-two", &FAST).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn different_params_differ() {
        let k1 = derive_kek_with_params("unittests", &FAST).unwrap();
        let k2 = derive_kek_with_params("unittests", &KdfParams::new(2048, 1, 1)).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn empty_passphrase_rejected() {
        assert!(matches!(derive_kek_with_params("", &FAST), Err(CryptoError::InvalidInput(_))));
    }

    #[test]
    fn invalid_params_rejected() {
        let params = KdfParams::new(1024, 0, 1);
        assert!(matches!(
            derive_kek_with_params("unittests", &params),
            Err(CryptoError::KeyDerivation(_))
        ));
    }
}
