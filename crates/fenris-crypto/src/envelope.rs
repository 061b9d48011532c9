//! Message envelope using AES-256-GCM.
//!
//! Layout: `nonce (12 bytes) ‖ ciphertext ‖ tag (16 bytes)`.
//!
//! Both functions are pure. The nonce is supplied by the caller, which MUST
//! draw it fresh from a CSPRNG for every call; reusing a nonce under the same
//! session key breaks GCM confidentiality and authenticity.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};

use crate::{error::CryptoError, key_exchange::SessionKey};

/// AES-GCM nonce size (96 bits)
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size
pub const TAG_SIZE: usize = 16;

/// Encrypt `plaintext` under `key` and return the complete envelope.
///
/// # Errors
///
/// - `EncryptionFailed` if the plaintext exceeds the AES-GCM message limit
pub fn seal(
    key: &SessionKey,
    plaintext: &[u8],
    nonce: [u8; NONCE_SIZE],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let ciphertext = cipher
        .encrypt(&Nonce::from(nonce), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut envelope = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&ciphertext);

    debug_assert_eq!(envelope.len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);

    Ok(envelope)
}

/// Verify and decrypt an envelope produced by [`seal`].
///
/// # Errors
///
/// - `InvalidEnvelope` if `envelope` cannot hold a nonce and a tag
/// - `AuthenticationFailed` on wrong key or any modification
pub fn open(key: &SessionKey, envelope: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if envelope.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::InvalidEnvelope {
            len: envelope.len(),
            min: NONCE_SIZE + TAG_SIZE,
        });
    }

    let (nonce, ciphertext) = envelope.split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    cipher
        .decrypt(nonce.into(), ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailed)
}
