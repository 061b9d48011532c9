//! Fenris server.
//!
//! Accepts TCP connections, runs the responder side of the handshake on each
//! one, and serves encrypted requests with a [`CommandHandler`].
//!
//! # Architecture
//!
//! One OS thread per connection. The accept loop registers each socket in the
//! [`ConnectionRegistry`] and hands it to a worker, which owns the
//! [`Connection`] for its whole life:
//!
//! ```text
//! accept ─► register ─► worker: handshake ─┬─► receive request
//!                                          │        │
//!                                          │   handler.handle
//!                                          │        │
//!                                          └── send response (close after TERMINATE)
//! ```
//!
//! Shutdown is cooperative. [`ServerHandle::stop`] clears the running flag,
//! wakes the blocked `accept` with a loopback connection, shuts down every
//! registered socket so that workers see end-of-stream, and joins all
//! threads.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod handler;
mod registry;

use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
};

pub use error::ServerError;
use fenris_core::{Connection, ConnectionConfig, ConnectionError, Environment, SystemEnv};
use fenris_proto::{Request, Response};
pub use handler::{CommandHandler, FileService};
pub use registry::{ConnectionEntry, ConnectionRegistry};
use tracing::{debug, info, warn};

/// Default listening address
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:7878";

/// Default limit on simultaneous connections
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "0.0.0.0:7878")
    pub bind_address: String,
    /// Connections beyond this are closed right after `accept`
    pub max_connections: usize,
    /// Per-connection settings (handshake timeout, socket options).
    /// `nonblocking` is forced off; workers block on their socket.
    pub connection: ConnectionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connection: ConnectionConfig::default(),
        }
    }
}

/// State shared between the accept loop, workers and the [`ServerHandle`].
#[derive(Debug, Default)]
struct Shared {
    running: AtomicBool,
    registry: Mutex<ConnectionRegistry>,
}

impl Shared {
    fn registry(&self) -> MutexGuard<'_, ConnectionRegistry> {
        // A worker that panicked while holding the lock cannot leave the map
        // half-updated, so a poisoned registry is still usable.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Fenris server bound to a listening socket.
pub struct Server<H: CommandHandler, E: Environment = SystemEnv> {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
    handler: Arc<H>,
    env: E,
    shared: Arc<Shared>,
}

impl<H: CommandHandler> Server<H, SystemEnv> {
    /// Bind the listening socket.
    ///
    /// # Errors
    ///
    /// - `ServerError::Config` if the address cannot be bound or the
    ///   connection limit is zero
    pub fn bind(config: ServerConfig, handler: H) -> Result<Self, ServerError> {
        Self::bind_with_env(config, handler, SystemEnv::new())
    }
}

impl<H: CommandHandler, E: Environment> Server<H, E> {
    /// Bind the listening socket, drawing all randomness from `env`.
    ///
    /// Workers always use blocking sockets. A configured `nonblocking` flag
    /// is ignored; use `read_timeout` to bound idle reads instead.
    pub fn bind_with_env(
        mut config: ServerConfig,
        handler: H,
        env: E,
    ) -> Result<Self, ServerError> {
        if config.max_connections == 0 {
            return Err(ServerError::Config("max_connections must be at least 1".to_string()));
        }

        if config.connection.nonblocking {
            warn!("non-blocking connections are not supported by the server, using blocking mode");
            config.connection.nonblocking = false;
        }

        let listener = TcpListener::bind(&config.bind_address)
            .map_err(|e| ServerError::Config(format!("cannot bind {}: {e}", config.bind_address)))?;
        let local_addr = listener.local_addr()?;

        let shared = Arc::new(Shared { running: AtomicBool::new(true), ..Shared::default() });

        Ok(Self { listener, local_addr, config, handler: Arc::new(handler), env, shared })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run the accept loop on the current thread.
    ///
    /// Returns once the server is stopped through a [`ServerHandle`], after
    /// every worker has exited.
    pub fn run(&self) -> Result<(), ServerError> {
        info!(addr = %self.local_addr, max_connections = self.config.max_connections, "server listening");

        let mut workers: Vec<JoinHandle<()>> = Vec::new();

        for incoming in self.listener.incoming() {
            if !self.shared.is_running() {
                break;
            }

            match incoming {
                Ok(stream) => {
                    workers.retain(|worker| !worker.is_finished());
                    if let Some(worker) = self.dispatch(stream) {
                        workers.push(worker);
                    }
                },
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }

        let closed = self.shared.registry().shutdown_all();
        info!(open_connections = closed, "server stopping");

        for worker in workers {
            if worker.join().is_err() {
                warn!("connection worker panicked");
            }
        }

        info!(addr = %self.local_addr, "server stopped");
        Ok(())
    }

    /// Run the accept loop on a background thread.
    pub fn spawn(self) -> Result<ServerHandle, ServerError> {
        let local_addr = self.local_addr;
        let shared = Arc::clone(&self.shared);

        let thread = thread::Builder::new()
            .name("fenris-accept".to_string())
            .spawn(move || self.run())
            .map_err(|e| ServerError::Internal(format!("cannot spawn accept thread: {e}")))?;

        Ok(ServerHandle { local_addr, shared, thread: Some(thread) })
    }

    /// Register `stream` and start its worker.
    fn dispatch(&self, stream: TcpStream) -> Option<JoinHandle<()>> {
        let peer = match stream.peer_addr() {
            Ok(peer) => peer,
            Err(e) => {
                debug!(error = %e, "peer vanished before dispatch");
                return None;
            },
        };

        let id = self.env.random_u64();

        {
            let mut registry = self.shared.registry();

            if registry.len() >= self.config.max_connections {
                warn!(%peer, limit = self.config.max_connections, "connection limit reached, rejecting");
                return None;
            }

            let handle = match stream.try_clone() {
                Ok(handle) => handle,
                Err(e) => {
                    warn!(%peer, error = %e, "cannot clone socket, rejecting");
                    return None;
                },
            };

            if !registry.register(id, peer, handle) {
                warn!(%peer, id, "connection id collision, rejecting");
                return None;
            }
        }

        debug!(%peer, id, "connection accepted");

        let handler = Arc::clone(&self.handler);
        let shared = Arc::clone(&self.shared);
        let config = self.config.connection.clone();
        let env = self.env.clone();

        let spawned = thread::Builder::new().name(format!("fenris-conn-{id:016x}")).spawn(
            move || {
                serve_connection(stream, id, peer, handler.as_ref(), config, env, &shared);
                shared.registry().unregister(id);
            },
        );

        match spawned {
            Ok(worker) => Some(worker),
            Err(e) => {
                warn!(%peer, error = %e, "cannot spawn worker, rejecting");
                self.shared.registry().unregister(id);
                None
            },
        }
    }
}

/// Handshake, then answer requests until the client leaves, asks to
/// terminate, or the server stops.
fn serve_connection<H: CommandHandler, E: Environment>(
    stream: TcpStream,
    id: u64,
    peer: SocketAddr,
    handler: &H,
    config: ConnectionConfig,
    env: E,
    shared: &Shared,
) {
    let mut conn = match Connection::accept(stream, format!("conn-{id:016x}"), config, env) {
        Ok(conn) => conn,
        Err(e) => {
            warn!(%peer, id, error = %e, "handshake failed");
            return;
        },
    };

    loop {
        let request = match conn.receive::<Request>() {
            Ok(request) => request,
            Err(ConnectionError::Protocol(e)) => {
                warn!(%peer, id, error = %e, "malformed request");
                if conn.send(&Response::error(format!("malformed request: {e}"))).is_err() {
                    break;
                }
                continue;
            },
            Err(ConnectionError::WouldBlock) if shared.is_running() => continue,
            Err(ConnectionError::PeerClosed) => {
                debug!(%peer, id, "client closed connection");
                break;
            },
            Err(e) => {
                debug!(%peer, id, error = %e, "connection ended");
                break;
            },
        };

        let response = handler.handle(&request);

        if let Err(e) = conn.send(&response) {
            warn!(%peer, id, error = %e, "failed to send response");
            break;
        }

        if request.is_terminate() {
            info!(%peer, id, "client requested termination");
            break;
        }
    }

    conn.disconnect();
}

/// Control handle for a server started with [`Server::spawn`].
///
/// Dropping the handle stops the server.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<Result<(), ServerError>>>,
}

impl ServerHandle {
    /// Local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.shared.registry().len()
    }

    /// True until [`ServerHandle::stop`] has been called.
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Stop accepting, close every client connection, and wait for all
    /// server threads to exit. Idempotent.
    pub fn stop(&mut self) -> Result<(), ServerError> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        self.shared.running.store(false, Ordering::SeqCst);

        // Unblock `accept`. The loop sees the flag and exits before
        // dispatching this connection.
        if let Err(e) = TcpStream::connect(wake_address(self.local_addr)) {
            debug!(error = %e, "wake-up connection failed");
        }

        thread.join().map_err(|_| ServerError::Internal("accept thread panicked".to_string()))?
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "server shutdown failed");
        }
    }
}

/// Address to dial to reach a listener bound to `addr`.
fn wake_address(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => (Ipv4Addr::LOCALHOST, addr.port()).into(),
        IpAddr::V6(ip) if ip.is_unspecified() => (Ipv6Addr::LOCALHOST, addr.port()).into(),
        _ => addr,
    }
}
