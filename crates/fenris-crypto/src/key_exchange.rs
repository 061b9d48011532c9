//! Ephemeral ECDH (P-256) and session key derivation.

use std::fmt;

use hkdf::Hkdf;
use p256::{PublicKey, SecretKey, elliptic_curve::sec1::ToEncodedPoint};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Length of a private scalar seed
pub const SCALAR_SIZE: usize = 32;

/// Length of an uncompressed SEC1 P-256 public key
pub const PUBLIC_KEY_SIZE: usize = 65;

/// Length of the derived AES-256 session key
pub const SESSION_KEY_SIZE: usize = 32;

/// HKDF info label binding derived keys to this protocol and version
pub const SESSION_KEY_INFO: &[u8] = b"fenris-session-key-v1";

/// Single-use P-256 keypair for one handshake.
///
/// The private half is only reachable through [`EphemeralKeypair::agree`],
/// which consumes the keypair. `p256::SecretKey` zeroizes itself on drop, so
/// the scalar is wiped as soon as the shared secret has been computed.
pub struct EphemeralKeypair {
    secret: SecretKey,
    public: Vec<u8>,
}

impl EphemeralKeypair {
    /// Build a keypair from 32 bytes of CSPRNG output.
    ///
    /// # Errors
    ///
    /// - `CryptoError::InvalidScalar` if the bytes are zero or not below the
    ///   P-256 group order (probability ~2^-32). Draw fresh bytes and retry.
    pub fn from_scalar_bytes(seed: &[u8; SCALAR_SIZE]) -> Result<Self, CryptoError> {
        let secret = SecretKey::from_slice(seed).map_err(|_| CryptoError::InvalidScalar)?;
        let public = secret.public_key().to_encoded_point(false).as_bytes().to_vec();

        debug_assert_eq!(public.len(), PUBLIC_KEY_SIZE);

        Ok(Self { secret, public })
    }

    /// Uncompressed SEC1 encoding of the public key, as sent on the wire.
    pub fn public_key(&self) -> &[u8] {
        &self.public
    }

    /// Complete the exchange with the peer's public key and derive the
    /// session key.
    ///
    /// Consumes the keypair. The private scalar and the raw shared secret are
    /// both zeroized before this function returns.
    ///
    /// # Errors
    ///
    /// - `CryptoError::MalformedPublicKey` if `peer_public` is not a valid
    ///   SEC1 point on P-256 (including the identity)
    /// - `CryptoError::KeyDerivation` if HKDF fails
    pub fn agree(self, peer_public: &[u8]) -> Result<SessionKey, CryptoError> {
        let peer = PublicKey::from_sec1_bytes(peer_public)
            .map_err(|_| CryptoError::MalformedPublicKey { len: peer_public.len() })?;

        let shared = p256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), peer.as_affine());

        SessionKey::derive(shared.raw_secret_bytes())
    }
}

impl fmt::Debug for EphemeralKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeypair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Symmetric key protecting one connection.
///
/// Zeroized on drop. `Debug` never prints key bytes.
pub struct SessionKey {
    key: [u8; SESSION_KEY_SIZE],
}

impl SessionKey {
    /// Derive a session key from ECDH shared secret bytes with HKDF-SHA256.
    ///
    /// Deterministic: both ends of a connection feed the same shared secret
    /// and obtain the same key.
    ///
    /// # Errors
    ///
    /// - `CryptoError::KeyDerivation` if HKDF rejects the output length
    pub fn derive(shared_secret: &[u8]) -> Result<Self, CryptoError> {
        let hkdf = Hkdf::<Sha256>::new(None, shared_secret);

        let mut key = [0u8; SESSION_KEY_SIZE];
        hkdf.expand(SESSION_KEY_INFO, &mut key).map_err(|_| CryptoError::KeyDerivation)?;

        Ok(Self { key })
    }

    /// Wrap raw key bytes (tests and tooling).
    pub fn from_bytes(key: [u8; SESSION_KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Raw key bytes for the AEAD.
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.key
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}
