//! Error types for the connection layer.
//!
//! Every failure a caller can observe is one of these variants; nothing in
//! this crate panics on bad input or a misbehaving peer. Whether an error
//! ends the connection is decided in one place, [`ConnectionError::is_fatal`].

use std::time::Duration;

use fenris_crypto::CryptoError;
use fenris_proto::{FrameError, ProtocolError};
use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors raised while establishing the session key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Public key frame could not be sent or received
    #[error("handshake framing failed: {0}")]
    Frame(FrameError),

    /// Peer did not complete its half of the exchange in time
    #[error("handshake timed out after {after:?}")]
    Timeout {
        /// Configured handshake timeout
        after: Duration,
    },

    /// Peer sent bytes that are not a valid P-256 public key
    #[error("peer sent a malformed public key ({len} bytes)")]
    MalformedPublicKey {
        /// Length of the rejected key frame
        len: usize,
    },

    /// No valid private scalar after repeated draws from the environment
    #[error("could not generate an ephemeral keypair")]
    KeyGeneration,

    /// Shared secret could not be turned into a session key
    #[error("session key derivation failed")]
    KeyDerivation,
}

/// Errors from connection lifecycle and message exchange operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Operation not allowed in the current state
    #[error("invalid state: cannot {operation} while {state:?}")]
    InvalidState {
        /// State when the operation was attempted
        state: ConnectionState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// TCP connection to the peer could not be opened
    #[error("failed to connect to {addr}: {reason}")]
    ConnectFailed {
        /// Address that was dialed
        addr: String,
        /// Reason reported by the resolver or the OS
        reason: String,
    },

    /// Socket failure after the connection was established
    #[error("network error: {0}")]
    Network(String),

    /// Peer closed the connection
    #[error("connection closed by peer")]
    PeerClosed,

    /// Non-blocking socket or I/O timeout had nothing to transfer
    #[error("operation would block")]
    WouldBlock,

    /// Message does not fit in a single frame once encrypted
    #[error("message too large: {size} bytes exceeds maximum {max}")]
    MessageTooLarge {
        /// Plaintext size
        size: usize,
        /// Largest plaintext that fits in one frame
        max: usize,
    },

    /// Peer violated the framing rules
    #[error("framing error: {0}")]
    Framing(FrameError),

    /// Key exchange failed
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// Envelope could not be sealed or opened
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Payload could not be serialized or deserialized
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ConnectionError {
    /// Returns true if the connection is no longer usable after this error.
    ///
    /// Network failures, framing violations and failed authentication all
    /// close the connection. Payload decode failures, would-block results,
    /// oversize local messages and state errors leave it as it was.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::InvalidState { .. }
                | Self::WouldBlock
                | Self::MessageTooLarge { .. }
                | Self::Protocol(_)
        )
    }
}

impl From<FrameError> for ConnectionError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::ConnectionClosed => Self::PeerClosed,
            FrameError::WouldBlock => Self::WouldBlock,
            FrameError::Io { reason, .. } => Self::Network(reason),
            stalled @ FrameError::Stalled { .. } => Self::Network(stalled.to_string()),
            other => Self::Framing(other),
        }
    }
}
