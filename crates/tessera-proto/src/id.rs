//! Device identities.

use std::{fmt, str::FromStr};

use tessera_crypto::hash_id_alias;

use crate::ProtocolError;

/// Size of a device identity in bytes
pub const DEVICE_ID_SIZE: usize = 16;

/// Fixed-length opaque device identifier.
///
/// Immutable once created. Displays as 32 lowercase hex characters, which is
/// also the form used in control topic names.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId([u8; DEVICE_ID_SIZE]);

impl DeviceId {
    /// Wrap raw identity bytes.
    pub const fn from_bytes(bytes: [u8; DEVICE_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Derive an identity from a human-readable alias (truncated SHA-256).
    ///
    /// Lets operators and devices agree on an id from a name alone.
    pub fn from_alias(alias: &str) -> Self {
        Self(hash_id_alias(alias))
    }

    /// Parse 32 hex characters.
    pub fn from_hex(text: &str) -> Result<Self, ProtocolError> {
        let bytes = hex::decode(text).map_err(|e| ProtocolError::InvalidIdEncoding(e.to_string()))?;
        Self::try_from(bytes.as_slice())
    }

    /// Raw identity bytes.
    pub fn as_bytes(&self) -> &[u8; DEVICE_ID_SIZE] {
        &self.0
    }

    /// Lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl TryFrom<&[u8]> for DeviceId {
    type Error = ProtocolError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let array = bytes.try_into().map_err(|_| ProtocolError::InvalidIdLength {
            expected: DEVICE_ID_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(array))
    }
}

impl FromStr for DeviceId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let id = DeviceId::from_bytes([0xA5; DEVICE_ID_SIZE]);
        assert_eq!(id.to_hex(), "a5".repeat(16));
        assert_eq!(DeviceId::from_hex(&id.to_hex()).unwrap(), id);
        assert_eq!(id.to_hex().parse::<DeviceId>().unwrap(), id);
    }

    #[test]
    fn wrong_length_rejected() {
        let result = DeviceId::try_from(&[0u8; 15][..]);
        assert_eq!(result, Err(ProtocolError::InvalidIdLength { expected: 16, actual: 15 }));

        assert!(matches!(
            DeviceId::from_hex("abcd"),
            Err(ProtocolError::InvalidIdLength { expected: 16, actual: 2 })
        ));
    }

    #[test]
    fn non_hex_rejected() {
        assert!(matches!(
            DeviceId::from_hex("not hex at all, definitely not!!"),
            Err(ProtocolError::InvalidIdEncoding(_))
        ));
    }

    #[test]
    fn alias_is_deterministic() {
        assert_eq!(DeviceId::from_alias("testid"), DeviceId::from_alias("testid"));
        assert_ne!(DeviceId::from_alias("testid"), DeviceId::from_alias("testid2"));
    }

    #[test]
    fn display_matches_hex() {
        let id = DeviceId::from_bytes([0x01; DEVICE_ID_SIZE]);
        assert_eq!(format!("{id}"), id.to_hex());
        assert_eq!(format!("{id:?}"), format!("DeviceId({})", id.to_hex()));
    }
}
