//! Fenris Cryptographic Primitives
//!
//! Cryptographic building blocks for the Fenris secure channel. Pure functions
//! with deterministic outputs: callers supply the random bytes (scalar seeds
//! and nonces), which keeps the primitives testable and leaves the choice of
//! entropy source to the connection layer.
//!
//! # Key Lifecycle
//!
//! Every connection runs exactly one key exchange. Nothing derived here is
//! persisted or reused across connections.
//!
//! ```text
//! CSPRNG bytes ──► Ephemeral P-256 keypair ──┐
//!                                            │ ECDH with peer public key
//!                                            ▼
//!                                      Shared secret
//!                                            │ HKDF-SHA256 (fixed info label)
//!                                            ▼
//!                                       Session key
//!                                            │ AES-256-GCM, fresh nonce per message
//!                                            ▼
//!                                 nonce ‖ ciphertext ‖ tag
//! ```
//!
//! # Security
//!
//! Forward Secrecy:
//! - Ephemeral keypairs: a new private scalar per handshake, consumed by
//!   [`EphemeralKeypair::agree`] and zeroized when it goes out of scope
//! - Shared secret: zeroized on drop immediately after key derivation
//! - Session key: zeroized when the connection drops it
//!
//! Authenticity:
//! - AES-256-GCM rejects any modified nonce, ciphertext or tag
//! - Failed authentication is a single terminal error; no partial plaintext
//!
//! Nonce Uniqueness:
//! - 96-bit nonces drawn from a CSPRNG for every seal; a session key encrypts
//!   far fewer messages than the birthday bound for random 96-bit nonces
//!
//! Not provided: peer authentication. The exchange is anonymous
//! Diffie-Hellman and protects against passive observers only.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod envelope;
pub mod error;
pub mod key_exchange;

pub use envelope::{NONCE_SIZE, TAG_SIZE, open, seal};
pub use error::CryptoError;
pub use key_exchange::{
    EphemeralKeypair, PUBLIC_KEY_SIZE, SCALAR_SIZE, SESSION_KEY_INFO, SESSION_KEY_SIZE, SessionKey,
};
