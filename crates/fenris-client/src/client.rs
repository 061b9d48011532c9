//! Client connection manager.

use fenris_core::{
    Connection, ConnectionConfig, ConnectionError, ConnectionState, Environment, SystemEnv,
};
use fenris_proto::{Request, Response};
use tracing::debug;

/// Client side of a Fenris connection.
///
/// Created disconnected; [`Client::connect`] opens the socket and runs the
/// handshake. Requests can only be sent while connected. After any network
/// or cryptographic failure the client is disconnected and must call
/// `connect` again, which starts a brand-new session.
#[derive(Debug)]
pub struct Client<E: Environment = SystemEnv> {
    conn: Connection<E>,
}

impl Client<SystemEnv> {
    /// Client for `host:port` with default settings.
    ///
    /// `label` only appears in logs.
    pub fn new(host: impl Into<String>, port: u16, label: impl Into<String>) -> Self {
        Self { conn: Connection::new(host, port, label) }
    }

    /// Client with explicit connection settings.
    pub fn with_config(
        host: impl Into<String>,
        port: u16,
        label: impl Into<String>,
        config: ConnectionConfig,
    ) -> Self {
        Self { conn: Connection::with_config(host, port, label, config) }
    }
}

impl<E: Environment> Client<E> {
    /// Client drawing keys and nonces from `env`.
    pub fn with_env(
        host: impl Into<String>,
        port: u16,
        label: impl Into<String>,
        config: ConnectionConfig,
        env: E,
    ) -> Self {
        Self { conn: Connection::with_env(host, port, label, config, env) }
    }

    /// Open the connection and establish a session key.
    ///
    /// A no-op if already connected.
    pub fn connect(&mut self) -> Result<(), ConnectionError> {
        self.conn.connect()
    }

    /// Close the connection. Safe to call at any time, any number of times.
    pub fn disconnect(&mut self) {
        self.conn.disconnect();
    }

    /// True while a session is established.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    /// Diagnostic label.
    pub fn label(&self) -> &str {
        self.conn.label()
    }

    /// Encrypt and send one request.
    pub fn send_request(&mut self, request: &Request) -> Result<(), ConnectionError> {
        debug!(label = %self.conn.label(), command = ?request.command, "sending request");
        self.conn.send(request)
    }

    /// Wait for and decrypt one response.
    pub fn receive_response(&mut self) -> Result<Response, ConnectionError> {
        self.conn.receive()
    }

    /// Send `request` and wait for its response.
    ///
    /// After a TERMINATE exchange the server closes its end, so the client
    /// disconnects too.
    pub fn request(&mut self, request: &Request) -> Result<Response, ConnectionError> {
        self.send_request(request)?;
        let response = self.receive_response()?;

        if request.is_terminate() {
            debug!(label = %self.conn.label(), "terminate acknowledged, disconnecting");
            self.disconnect();
        }

        Ok(response)
    }
}
