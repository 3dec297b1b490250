//! Authenticated envelopes for commands and application data.
//!
//! Both kinds use the embedded-nonce form of `XChaCha20-Poly1305`, so an
//! envelope is self-contained: `[nonce: 24][ciphertext][tag: 16]`.

use tessera_crypto::{Key, decrypt, encrypt};
use zeroize::Zeroize;

use crate::{Command, ProtocolError};

/// Encode a command and seal it under a device's root key.
pub fn seal_command(command: &Command, root_key: &Key) -> Result<Vec<u8>, ProtocolError> {
    let mut plaintext = command.encode();
    let sealed = encrypt(root_key, None, &plaintext);
    plaintext.zeroize();
    Ok(sealed?)
}

/// Open a command envelope with the device's root key and decode it.
///
/// # Errors
///
/// - `Crypto(Authentication)`: wrong key or tampered envelope
/// - Any decode error from [`Command::decode`]
pub fn open_command(envelope: &[u8], root_key: &Key) -> Result<Command, ProtocolError> {
    let mut plaintext = decrypt(root_key, None, envelope)?;
    let command = Command::decode(&plaintext);
    plaintext.zeroize();
    command
}

/// Seal application data under a topic key.
pub fn protect(plaintext: &[u8], topic_key: &Key) -> Result<Vec<u8>, ProtocolError> {
    Ok(encrypt(topic_key, None, plaintext)?)
}

/// Open application data sealed with [`protect`].
pub fn unprotect(envelope: &[u8], topic_key: &Key) -> Result<Vec<u8>, ProtocolError> {
    Ok(decrypt(topic_key, None, envelope)?)
}
