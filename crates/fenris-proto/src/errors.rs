//! Error types for the Fenris wire protocol.
//!
//! Framing errors and payload (CBOR) errors are kept apart: a framing error
//! means the byte stream itself is unusable, while a payload error only
//! affects the single message that failed to decode.

use std::io;

use thiserror::Error;

/// Errors raised while sending or receiving a length-prefixed frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Frame declared (or was asked to carry) a zero-length payload
    #[error("empty frame: payload length must be non-zero")]
    Empty,

    /// Frame length exceeds [`crate::MAX_FRAME_SIZE`]
    #[error("frame too large: {size} bytes exceeds maximum {max}")]
    TooLarge {
        /// Declared or requested payload size
        size: usize,
        /// Maximum allowed payload size
        max: usize,
    },

    /// Buffer holds fewer bytes than the frame header requires
    #[error("frame truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes required
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Peer closed the stream before a full frame was transferred
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Peer stopped accepting bytes partway through a frame
    #[error("send stalled after {sent} of {total} frame bytes")]
    Stalled {
        /// Bytes of the frame (header included) already written
        sent: usize,
        /// Full frame length on the wire
        total: usize,
    },

    /// Non-blocking socket has no data (or no buffer space) right now
    #[error("operation would block")]
    WouldBlock,

    /// Any other I/O failure
    #[error("i/o error ({kind:?}): {reason}")]
    Io {
        /// Kind reported by the operating system
        kind: io::ErrorKind,
        /// Human-readable description
        reason: String,
    },
}

impl FrameError {
    /// Returns true if the stream can no longer be trusted to be aligned on a
    /// frame boundary.
    ///
    /// Only [`FrameError::WouldBlock`] leaves the stream usable; the reader
    /// keeps any partial bytes and resumes on the next call.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::WouldBlock)
    }
}

impl From<io::Error> for FrameError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::WouldBlock,
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Self::ConnectionClosed,
            kind => Self::Io { kind, reason: err.to_string() },
        }
    }
}

/// Errors raised while encoding or decoding message payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Failed to encode a message as CBOR
    #[error("failed to encode CBOR: {0}")]
    Encode(String),

    /// Failed to decode CBOR into the expected message type
    #[error("failed to decode CBOR: {0}")]
    Decode(String),
}

/// Convenient Result type alias for payload operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_would_block_is_recoverable() {
        assert!(!FrameError::WouldBlock.is_fatal());
        assert!(FrameError::Empty.is_fatal());
        assert!(FrameError::ConnectionClosed.is_fatal());
        assert!(FrameError::TooLarge { size: 11, max: 10 }.is_fatal());
        assert!(FrameError::Stalled { sent: 1, total: 9 }.is_fatal());
    }

    #[test]
    fn io_errors_map_to_frame_errors() {
        let closed: FrameError = io::Error::from(io::ErrorKind::UnexpectedEof).into();
        assert_eq!(closed, FrameError::ConnectionClosed);

        let reset: FrameError = io::Error::from(io::ErrorKind::ConnectionReset).into();
        assert_eq!(reset, FrameError::ConnectionClosed);

        let blocked: FrameError = io::Error::from(io::ErrorKind::WouldBlock).into();
        assert_eq!(blocked, FrameError::WouldBlock);

        let other: FrameError = io::Error::from(io::ErrorKind::PermissionDenied).into();
        assert!(matches!(other, FrameError::Io { kind: io::ErrorKind::PermissionDenied, .. }));
    }
}
