//! Fenris connection core.
//!
//! Ties the wire format ([`fenris_proto`]) and the cryptographic primitives
//! ([`fenris_crypto`]) into a [`Connection`]: one TCP socket, one handshake,
//! one session key, and a stream of encrypted messages.
//!
//! # Message Path
//!
//! ```text
//! send:    value ─► CBOR ─► seal(key, fresh nonce) ─► frame ─► socket
//! receive: socket ─► frame ─► open(key) ─► CBOR ─► value
//! ```
//!
//! The core never looks inside the messages it carries. Interpreting commands
//! (including TERMINATE) is left to the client and server crates.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod connection;
pub mod env;
pub mod error;
pub mod handshake;

pub use connection::{
    Connection, ConnectionConfig, ConnectionState, DEFAULT_HANDSHAKE_TIMEOUT, MAX_MESSAGE_SIZE,
    Role,
};
pub use env::{Environment, SystemEnv};
pub use error::{ConnectionError, HandshakeError};
