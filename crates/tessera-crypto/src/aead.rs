//! Authenticated encryption using `XChaCha20-Poly1305`
//!
//! Two output shapes share one primitive:
//!
//! - Embedded nonce (`nonce: None`): a random nonce is generated and prepended,
//!   `[nonce: 24][ciphertext][tag: 16]`. The output alone is enough to decrypt
//!   given the key. Used for stored key records and all envelopes.
//! - Detached nonce (`nonce: Some`): `[ciphertext][tag: 16]`. The caller keeps
//!   the nonce and must pass the same one to [`decrypt`].

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};

use crate::{CryptoError, Key};

/// `XChaCha20` nonce size (24 bytes)
pub const NONCE_SIZE: usize = 24;

/// Poly1305 tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

/// A 24-byte `XChaCha20` nonce
pub type Nonce = [u8; NONCE_SIZE];

/// Generate a random nonce from the OS CSPRNG.
pub fn random_nonce() -> Result<Nonce, CryptoError> {
    let mut nonce = [0u8; NONCE_SIZE];
    getrandom::fill(&mut nonce).map_err(|e| CryptoError::Entropy(e.to_string()))?;
    Ok(nonce)
}

/// Encrypt and authenticate `plaintext` under `key`.
///
/// With `nonce: None` a random nonce is generated and embedded in the output.
/// With `Some(nonce)` the output holds only ciphertext and tag.
///
/// # Security
///
/// - Caller-supplied nonces MUST NOT repeat under the same key
/// - The only failure is entropy exhaustion while drawing a nonce
pub fn encrypt(key: &Key, nonce: Option<&Nonce>, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if let Some(nonce) = nonce {
        return Ok(seal(key, nonce, plaintext));
    }

    let nonce = random_nonce()?;
    let sealed = seal(key, &nonce, plaintext);

    let mut output = Vec::with_capacity(NONCE_SIZE + sealed.len());
    output.extend_from_slice(&nonce);
    output.extend_from_slice(&sealed);
    Ok(output)
}

/// Verify and decrypt `ciphertext` under `key`.
///
/// With `nonce: None` the nonce is read from the first 24 bytes.
///
/// # Errors
///
/// - `Authentication`: tag mismatch, wrong key, wrong nonce, or input too short
///   to contain a nonce and tag
pub fn decrypt(key: &Key, nonce: Option<&Nonce>, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let (nonce, body) = match nonce {
        Some(nonce) => (nonce, ciphertext),
        None => ciphertext.split_first_chunk::<NONCE_SIZE>().ok_or(CryptoError::Authentication)?,
    };

    if body.len() < TAG_SIZE {
        return Err(CryptoError::Authentication);
    }

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher.decrypt(XNonce::from_slice(nonce), body).map_err(|_| CryptoError::Authentication)
}

fn seal(key: &Key, nonce: &Nonce, plaintext: &[u8]) -> Vec<u8> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(nonce), plaintext) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    ciphertext
}
