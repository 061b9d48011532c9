//! Server error types.

use std::fmt;

/// Errors that can occur in the server.
///
/// Failures on a single client connection never surface here. The worker
/// logs them and closes that connection while the server keeps running.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (unusable bind address, zero connection limit).
    ///
    /// Fatal: prevents server startup. Fix configuration and restart.
    Config(String),

    /// Transport/network error on the listening socket.
    ///
    /// May be transient (interrupted accept) or fatal (address in use).
    Transport(String),

    /// Internal error (a server thread panicked).
    ///
    /// Should never happen in a correct implementation. Indicates a bug.
    Internal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
