//! Connection lifecycle and message exchange.
//!
//! A [`Connection`] owns one TCP socket and at most one session key. It runs
//! the key exchange exactly once, right after the transport is up, and then
//! moves encrypted frames until it is disconnected.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐ connect ┌────────────┐ socket up ┌─────────────────────┐
//! │ Disconnected │────────>│ Connecting │──────────>│ HandshakeInProgress │
//! └──────────────┘         └────────────┘           └─────────────────────┘
//!        ^                       │                     │              │
//!        │                       │ dial failed         │ failed       │ key derived
//!        │<──────────────────────┘                     │              ↓
//!        │<────────────────────────────────────────────┘         ┌───────┐
//!        │<─────────────── disconnect / fatal I/O ───────────────│ Ready │
//!                                                                └───────┘
//! ```
//!
//! # Invariants
//!
//! - Session key exists only in `Ready`. It lives inside the socket-owning
//!   [`SecureChannel`], so closing the socket and zeroizing the key happen on
//!   the same drop, on every exit path.
//! - No reuse: a disconnected connection never resumes an old session. A new
//!   `connect()` runs a new handshake with new ephemeral keys.
//! - Every send draws a fresh nonce from the environment.

use std::{
    fmt,
    io,
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use fenris_crypto::{NONCE_SIZE, SessionKey, TAG_SIZE, open, seal};
use fenris_proto::{
    FrameError, FrameReader, MAX_FRAME_SIZE, SEND_STALL_LIMIT, codec, send_frame_within,
};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info, warn};

use crate::{
    env::{Environment, SystemEnv},
    error::{ConnectionError, HandshakeError},
    handshake,
};

/// Time allowed for the public key exchange.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest plaintext that still fits in one frame after encryption.
pub const MAX_MESSAGE_SIZE: usize = MAX_FRAME_SIZE - NONCE_SIZE - TAG_SIZE;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No socket, no session key
    Disconnected,
    /// Opening the TCP connection
    Connecting,
    /// Exchanging ephemeral public keys
    HandshakeInProgress,
    /// Session key established, messages can flow
    Ready,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::HandshakeInProgress => "handshake",
            Self::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Which side of the TCP connection this endpoint is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Opened the connection
    Initiator,
    /// Accepted the connection
    Responder,
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Upper bound on each handshake read and write
    pub handshake_timeout: Duration,
    /// Timeout for opening the TCP connection (OS default if `None`)
    pub connect_timeout: Option<Duration>,
    /// Read timeout once `Ready`; an expired read reports `WouldBlock`
    pub read_timeout: Option<Duration>,
    /// Write timeout once `Ready`. Also bounds how long a started frame may
    /// wait on a peer that stopped reading (five seconds if `None`).
    pub write_timeout: Option<Duration>,
    /// Put the socket in non-blocking mode once `Ready`
    pub nonblocking: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            nonblocking: false,
        }
    }
}

/// Socket, reader state and session key of an established connection.
struct SecureChannel {
    stream: TcpStream,
    reader: FrameReader,
    key: SessionKey,
    peer: Option<SocketAddr>,
    stall_limit: Duration,
}

impl SecureChannel {
    fn send<E: Environment>(&mut self, env: &E, plaintext: &[u8]) -> Result<(), ConnectionError> {
        let mut nonce = [0u8; NONCE_SIZE];
        env.random_bytes(&mut nonce);

        let envelope = seal(&self.key, plaintext, nonce)?;
        send_frame_within(&mut self.stream, &envelope, self.stall_limit)?;

        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<u8>, ConnectionError> {
        let envelope = self.reader.read_frame(&mut self.stream)?;

        Ok(open(&self.key, &envelope)?)
    }
}

/// One end of a secure channel.
///
/// Generic over the [`Environment`] so tests can make key generation and
/// nonces reproducible.
///
/// All operations take `&mut self`; a connection is a single flow and is not
/// meant to be shared between threads without external locking.
pub struct Connection<E: Environment = SystemEnv> {
    /// Host and port to dial (`None` for accepted connections)
    target: Option<(String, u16)>,
    /// Diagnostic name attached to every log event
    label: String,
    role: Role,
    config: ConnectionConfig,
    env: E,
    state: ConnectionState,
    /// Present exactly when `state == Ready`
    channel: Option<SecureChannel>,
}

impl Connection<SystemEnv> {
    /// Create an initiator for `host:port` with the default configuration.
    ///
    /// Nothing is opened until [`Connection::connect`].
    pub fn new(host: impl Into<String>, port: u16, label: impl Into<String>) -> Self {
        Self::with_config(host, port, label, ConnectionConfig::default())
    }

    /// Create an initiator with an explicit configuration.
    pub fn with_config(
        host: impl Into<String>,
        port: u16,
        label: impl Into<String>,
        config: ConnectionConfig,
    ) -> Self {
        Self::with_env(host, port, label, config, SystemEnv::new())
    }
}

impl<E: Environment> Connection<E> {
    /// Create an initiator that draws randomness from `env`.
    pub fn with_env(
        host: impl Into<String>,
        port: u16,
        label: impl Into<String>,
        config: ConnectionConfig,
        env: E,
    ) -> Self {
        Self {
            target: Some((host.into(), port)),
            label: label.into(),
            role: Role::Initiator,
            config,
            env,
            state: ConnectionState::Disconnected,
            channel: None,
        }
    }

    /// Run the responder side of the handshake on an accepted socket.
    ///
    /// Returns a `Ready` connection. An accepted connection cannot be
    /// re-established with [`Connection::connect`] after it is closed.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::Handshake` if the key exchange fails; the socket
    ///   is closed
    /// - `ConnectionError::Network` if socket options cannot be applied
    pub fn accept(
        stream: TcpStream,
        label: impl Into<String>,
        config: ConnectionConfig,
        env: E,
    ) -> Result<Self, ConnectionError> {
        let mut conn = Self {
            target: None,
            label: label.into(),
            role: Role::Responder,
            config,
            env,
            state: ConnectionState::Disconnected,
            channel: None,
        };

        conn.establish(stream)?;
        Ok(conn)
    }

    /// Open the socket and run the handshake.
    ///
    /// A no-op if the connection is already `Ready`.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` on an accepted connection
    /// - `ConnectionError::ConnectFailed` if the address does not resolve or
    ///   nothing accepts the connection
    /// - `ConnectionError::Handshake` if the key exchange fails
    ///
    /// The connection is `Disconnected` after any error.
    pub fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.state == ConnectionState::Ready {
            return Ok(());
        }

        let Some((host, port)) = self.target.clone() else {
            return Err(ConnectionError::InvalidState { state: self.state, operation: "connect" });
        };

        self.transition(ConnectionState::Connecting);

        let stream = match self.dial(&host, port) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(label = %self.label, error = %e, "connect failed");
                self.transition(ConnectionState::Disconnected);
                return Err(e);
            },
        };

        self.establish(stream)
    }

    /// Close the socket and discard the session key.
    ///
    /// Valid in every state and idempotent. Also runs on drop.
    pub fn disconnect(&mut self) {
        if let Some(channel) = self.channel.take() {
            if let Err(e) = channel.stream.shutdown(Shutdown::Both) {
                debug!(label = %self.label, error = %e, "socket shutdown failed");
            }
            info!(label = %self.label, peer = ?channel.peer, role = ?self.role, "disconnected");
        }

        if self.state != ConnectionState::Disconnected {
            self.transition(ConnectionState::Disconnected);
        }
    }

    /// True only in `Ready`.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Diagnostic label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Which side opened the connection
    pub fn role(&self) -> Role {
        self.role
    }

    /// Active configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Remote address while connected
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.channel.as_ref().and_then(|channel| channel.peer)
    }

    /// Serialize `message` as CBOR and send it encrypted.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` unless `Ready`
    /// - `ConnectionError::Protocol` if the message cannot be encoded
    /// - see [`Connection::send_bytes`]
    pub fn send<T: Serialize>(&mut self, message: &T) -> Result<(), ConnectionError> {
        self.ensure_ready("send")?;

        let payload = codec::encode(message)?;
        self.send_bytes(&payload)
    }

    /// Encrypt `plaintext` with a fresh nonce and send it as one frame.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` unless `Ready`
    /// - `ConnectionError::MessageTooLarge` if the envelope would not fit in
    ///   a frame; nothing is sent
    /// - `ConnectionError::WouldBlock` if a non-blocking socket cannot take
    ///   the frame yet; nothing is sent
    /// - `ConnectionError::PeerClosed` / `ConnectionError::Network` on socket
    ///   failure (the connection is closed)
    pub fn send_bytes(&mut self, plaintext: &[u8]) -> Result<(), ConnectionError> {
        if plaintext.len() > MAX_MESSAGE_SIZE {
            return Err(ConnectionError::MessageTooLarge {
                size: plaintext.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let state = self.state;
        let channel = match self.channel.as_mut() {
            Some(channel) if state == ConnectionState::Ready => channel,
            _ => return Err(ConnectionError::InvalidState { state, operation: "send" }),
        };

        let result = channel.send(&self.env, plaintext);
        self.settle("send", result)
    }

    /// Receive one message and deserialize it from CBOR.
    ///
    /// A payload that fails to decode is reported as
    /// `ConnectionError::Protocol`; the frame is consumed and the connection
    /// stays `Ready`.
    pub fn receive<T: DeserializeOwned>(&mut self) -> Result<T, ConnectionError> {
        let plaintext = self.receive_bytes()?;

        Ok(codec::decode(&plaintext)?)
    }

    /// Receive one frame and decrypt it.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` unless `Ready`
    /// - `ConnectionError::WouldBlock` if no complete frame is available on a
    ///   non-blocking socket (or the read timeout expired); partial data is
    ///   kept for the next call
    /// - `ConnectionError::PeerClosed`, `Network`, `Framing` or `Crypto` on
    ///   any other failure (the connection is closed)
    pub fn receive_bytes(&mut self) -> Result<Vec<u8>, ConnectionError> {
        let state = self.state;
        let channel = match self.channel.as_mut() {
            Some(channel) if state == ConnectionState::Ready => channel,
            _ => return Err(ConnectionError::InvalidState { state, operation: "receive" }),
        };

        let result = channel.receive();
        self.settle("receive", result)
    }

    fn ensure_ready(&self, operation: &'static str) -> Result<(), ConnectionError> {
        if self.state == ConnectionState::Ready && self.channel.is_some() {
            Ok(())
        } else {
            Err(ConnectionError::InvalidState { state: self.state, operation })
        }
    }

    /// Close the connection if `result` is a fatal error.
    fn settle<T>(
        &mut self,
        operation: &'static str,
        result: Result<T, ConnectionError>,
    ) -> Result<T, ConnectionError> {
        if let Err(e) = &result
            && e.is_fatal()
        {
            warn!(
                label = %self.label,
                peer = ?self.peer_addr(),
                role = ?self.role,
                error = %e,
                "{operation} failed, closing connection"
            );
            self.disconnect();
        }

        result
    }

    fn dial(&self, host: &str, port: u16) -> Result<TcpStream, ConnectionError> {
        let connect_failed = |reason: String| ConnectionError::ConnectFailed {
            addr: format!("{host}:{port}"),
            reason,
        };

        let addrs = (host, port).to_socket_addrs().map_err(|e| connect_failed(e.to_string()))?;

        let mut last_error = None;
        for addr in addrs {
            let attempt = match self.config.connect_timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };

            match attempt {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!(label = %self.label, %addr, error = %e, "dial attempt failed");
                    last_error = Some(e);
                },
            }
        }

        Err(connect_failed(
            last_error.map_or_else(|| "no addresses resolved".to_string(), |e| e.to_string()),
        ))
    }

    /// Handshake over a freshly connected socket, then apply the
    /// post-handshake socket options.
    fn establish(&mut self, mut stream: TcpStream) -> Result<(), ConnectionError> {
        self.transition(ConnectionState::HandshakeInProgress);

        let peer = stream.peer_addr().ok();
        let mut reader = FrameReader::new();

        let outcome = apply_handshake_options(&stream, self.config.handshake_timeout)
            .map_err(|e| ConnectionError::Network(e.to_string()))
            .and_then(|()| {
                handshake::perform(&mut stream, &mut reader, &self.env, self.role)
                    .map_err(|e| self.timeout_aware(e).into())
            })
            .and_then(|key| {
                apply_ready_options(&stream, &self.config)
                    .map(|()| key)
                    .map_err(|e| ConnectionError::Network(e.to_string()))
            });

        match outcome {
            Ok(key) => {
                let stall_limit =
                    self.config.write_timeout.filter(|t| !t.is_zero()).unwrap_or(SEND_STALL_LIMIT);
                self.channel = Some(SecureChannel { stream, reader, key, peer, stall_limit });
                self.transition(ConnectionState::Ready);
                info!(label = %self.label, ?peer, role = ?self.role, "secure channel established");
                Ok(())
            },
            Err(e) => {
                warn!(label = %self.label, ?peer, role = ?self.role, error = %e, "handshake failed");
                if let Err(shutdown) = stream.shutdown(Shutdown::Both) {
                    debug!(label = %self.label, error = %shutdown, "socket shutdown failed");
                }
                self.transition(ConnectionState::Disconnected);
                Err(e)
            },
        }
    }

    /// Handshake reads run under a timeout, which the socket reports as
    /// `WouldBlock`.
    fn timeout_aware(&self, err: HandshakeError) -> HandshakeError {
        match err {
            HandshakeError::Frame(FrameError::WouldBlock) => {
                HandshakeError::Timeout { after: self.config.handshake_timeout }
            },
            other => other,
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        debug!(label = %self.label, role = ?self.role, from = %self.state, to = %next, "state transition");
        self.state = next;
    }
}

impl<E: Environment> Drop for Connection<E> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<E: Environment> fmt::Debug for Connection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("label", &self.label)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("peer", &self.peer_addr())
            .finish_non_exhaustive()
    }
}

/// Blocking mode with the handshake timeout on both directions.
fn apply_handshake_options(stream: &TcpStream, timeout: Duration) -> io::Result<()> {
    // A zero timeout is rejected by the OS; treat it as "no limit".
    let timeout = (!timeout.is_zero()).then_some(timeout);

    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)
}

fn apply_ready_options(stream: &TcpStream, config: &ConnectionConfig) -> io::Result<()> {
    stream.set_read_timeout(config.read_timeout.filter(|t| !t.is_zero()))?;
    stream.set_write_timeout(config.write_timeout.filter(|t| !t.is_zero()))?;
    stream.set_nonblocking(config.nonblocking)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_connection_is_disconnected() {
        let conn = Connection::new("127.0.0.1", 9, "unit");

        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(!conn.is_connected());
        assert_eq!(conn.label(), "unit");
        assert_eq!(conn.role(), Role::Initiator);
        assert_eq!(conn.peer_addr(), None);
    }

    #[test]
    fn operations_require_ready() {
        let mut conn = Connection::new("127.0.0.1", 9, "unit");

        assert_eq!(
            conn.send_bytes(b"hello"),
            Err(ConnectionError::InvalidState {
                state: ConnectionState::Disconnected,
                operation: "send"
            })
        );
        assert_eq!(
            conn.receive_bytes(),
            Err(ConnectionError::InvalidState {
                state: ConnectionState::Disconnected,
                operation: "receive"
            })
        );
        assert!(matches!(
            conn.send(&"typed"),
            Err(ConnectionError::InvalidState { operation: "send", .. })
        ));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn oversize_message_rejected_before_state_check() {
        let mut conn = Connection::new("127.0.0.1", 9, "unit");
        let huge = vec![0u8; MAX_MESSAGE_SIZE + 1];

        assert_eq!(
            conn.send_bytes(&huge),
            Err(ConnectionError::MessageTooLarge { size: MAX_MESSAGE_SIZE + 1, max: MAX_MESSAGE_SIZE })
        );
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut conn = Connection::new("127.0.0.1", 9, "unit");

        conn.disconnect();
        conn.disconnect();

        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn unresolvable_host_fails_to_connect() {
        let mut conn = Connection::new("host.invalid", 7878, "unit");

        let result = conn.connect();

        assert!(matches!(result, Err(ConnectionError::ConnectFailed { .. })));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn default_config_matches_documented_values() {
        let config = ConnectionConfig::default();

        assert_eq!(config.handshake_timeout, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, None);
        assert!(!config.nonblocking);
    }

    #[test]
    fn max_message_fits_in_one_frame() {
        assert_eq!(MAX_MESSAGE_SIZE + NONCE_SIZE + TAG_SIZE, MAX_FRAME_SIZE);
    }
}
