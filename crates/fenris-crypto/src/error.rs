//! Error types for cryptographic operations.
//!
//! Messages deliberately carry sizes and reasons only, never key bytes or
//! plaintext.

use thiserror::Error;

/// Errors from key exchange and envelope operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Random bytes do not form a valid P-256 private scalar (zero or not
    /// below the group order). Draw new bytes and retry.
    #[error("random bytes are not a valid private scalar")]
    InvalidScalar,

    /// Peer public key is not a valid SEC1-encoded P-256 point
    #[error("malformed peer public key ({len} bytes)")]
    MalformedPublicKey {
        /// Length of the rejected encoding
        len: usize,
    },

    /// HKDF could not produce the session key
    #[error("session key derivation failed")]
    KeyDerivation,

    /// Envelope is too short to contain a nonce and an authentication tag
    #[error("invalid envelope: {len} bytes, need at least {min}")]
    InvalidEnvelope {
        /// Envelope length received
        len: usize,
        /// Minimum valid envelope length
        min: usize,
    },

    /// Authentication tag did not verify (wrong key or tampered envelope)
    #[error("authentication failed")]
    AuthenticationFailed,

    /// AEAD refused to encrypt (plaintext exceeds the algorithm limit)
    #[error("encryption failed")]
    EncryptionFailed,
}
