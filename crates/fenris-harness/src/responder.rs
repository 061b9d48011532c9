//! Scripted responder for client tests.
//!
//! [`Responder`] runs the production [`Server`] on `127.0.0.1:0`, so clients
//! under test go through the real handshake, envelope and framing code. Only
//! the command handler is replaced: [`RecordingHandler`] keeps every request
//! it sees and replies with whatever the test scripted (PONG `"PONG"` unless
//! told otherwise).

use std::{
    net::SocketAddr,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use fenris_core::ConnectionConfig;
use fenris_proto::{Request, Response};
use fenris_server::{CommandHandler, Server, ServerConfig, ServerError, ServerHandle};
use tracing::debug;

#[derive(Debug, Default)]
struct Inbox {
    requests: Vec<Request>,
    next_response: Option<Response>,
}

/// Command handler that records requests and replays scripted responses.
///
/// Clones share the same inbox.
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    inbox: Arc<(Mutex<Inbox>, Condvar)>,
}

impl RecordingHandler {
    /// Create a handler with an empty inbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request received so far, in arrival order.
    pub fn received_requests(&self) -> Vec<Request> {
        self.lock().requests.clone()
    }

    /// Reply to the next request with `response` instead of the default.
    ///
    /// One-shot: the request after that gets the default again.
    pub fn set_next_response(&self, response: Response) {
        self.lock().next_response = Some(response);
    }

    /// Block until at least `count` requests have arrived or `timeout`
    /// elapses. Returns true if the count was reached.
    pub fn wait_for_requests(&self, count: usize, timeout: Duration) -> bool {
        let (inbox, arrived) = &*self.inbox;
        let guard = inbox.lock().unwrap_or_else(PoisonError::into_inner);

        let (guard, _) = arrived
            .wait_timeout_while(guard, timeout, |inbox| inbox.requests.len() < count)
            .unwrap_or_else(PoisonError::into_inner);

        guard.requests.len() >= count
    }

    fn lock(&self) -> MutexGuard<'_, Inbox> {
        self.inbox.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CommandHandler for RecordingHandler {
    fn handle(&self, request: &Request) -> Response {
        let response = {
            let mut inbox = self.lock();
            inbox.requests.push(request.clone());
            inbox.next_response.take()
        };
        self.inbox.1.notify_all();

        debug!(command = ?request.command, scripted = response.is_some(), "responder recorded request");

        response.unwrap_or_else(|| Response::pong("PONG"))
    }
}

/// Live loopback server backed by a [`RecordingHandler`].
///
/// Stops on drop.
#[derive(Debug)]
pub struct Responder {
    handle: ServerHandle,
    handler: RecordingHandler,
}

impl Responder {
    /// Start a responder on an ephemeral loopback port.
    pub fn start() -> Result<Self, ServerError> {
        Self::start_with_config(ConnectionConfig::default())
    }

    /// Start a responder with custom per-connection settings.
    pub fn start_with_config(connection: ConnectionConfig) -> Result<Self, ServerError> {
        let config = ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            connection,
            ..ServerConfig::default()
        };

        let handler = RecordingHandler::new();
        let handle = Server::bind(config, handler.clone())?.spawn()?;

        debug!(addr = %handle.local_addr(), "responder started");

        Ok(Self { handle, handler })
    }

    /// Port clients should connect to.
    pub fn port(&self) -> u16 {
        self.handle.local_addr().port()
    }

    /// Full listening address.
    pub fn local_addr(&self) -> SocketAddr {
        self.handle.local_addr()
    }

    /// Every request received so far, across all connections.
    pub fn received_requests(&self) -> Vec<Request> {
        self.handler.received_requests()
    }

    /// See [`RecordingHandler::wait_for_requests`].
    pub fn wait_for_requests(&self, count: usize, timeout: Duration) -> bool {
        self.handler.wait_for_requests(count, timeout)
    }

    /// See [`RecordingHandler::set_next_response`].
    pub fn set_next_response(&self, response: Response) {
        self.handler.set_next_response(response);
    }

    /// Connections currently open on the server side.
    pub fn active_connections(&self) -> usize {
        self.handle.active_connections()
    }

    /// Stop the server and close every client connection. Idempotent.
    pub fn stop(&mut self) -> Result<(), ServerError> {
        self.handle.stop()
    }
}
