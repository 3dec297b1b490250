//! Symmetric key material

use std::fmt;

use zeroize::Zeroize;

use crate::CryptoError;

/// Size of every symmetric key in bytes (root keys, topic keys, the KEK)
pub const KEY_SIZE: usize = 32;

/// A 32-byte symmetric key.
///
/// Bytes are zeroized on drop. `Debug` output is redacted so keys never end up
/// in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Key([u8; KEY_SIZE]);

impl Key {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub(crate) fn zeroed() -> Self {
        Self([0u8; KEY_SIZE])
    }

    pub(crate) fn as_mut_bytes(&mut self) -> &mut [u8; KEY_SIZE] {
        &mut self.0
    }
}

impl TryFrom<&[u8]> for Key {
    type Error = CryptoError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let array: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidLength { expected: KEY_SIZE, actual: bytes.len() })?;
        Ok(Self(array))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(..)")
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Generate a fresh key from the OS CSPRNG.
pub fn random_key() -> Result<Key, CryptoError> {
    let mut key = Key::zeroed();
    getrandom::fill(key.as_mut_bytes()).map_err(|e| CryptoError::Entropy(e.to_string()))?;
    Ok(key)
}
