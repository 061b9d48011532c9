//! Registry of live client connections.
//!
//! Every accepted socket is registered (with a cloned handle) before its
//! worker starts and unregistered when the worker exits. The server uses the
//! registry to enforce the connection limit and, on shutdown, to unblock
//! workers stuck in a read by shutting their sockets down.

use std::{
    collections::HashMap,
    net::{Shutdown, SocketAddr, TcpStream},
};

/// A registered client connection.
#[derive(Debug)]
pub struct ConnectionEntry {
    /// Remote address of the client
    pub peer: SocketAddr,
    /// Second handle to the worker's socket, used only for shutdown
    stream: TcpStream,
}

/// Registry for tracking live connections by id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Connection ID → entry
    connections: HashMap<u64, ConnectionEntry>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection.
    ///
    /// Returns `false` if the id is already taken; the registry is unchanged.
    pub fn register(&mut self, id: u64, peer: SocketAddr, stream: TcpStream) -> bool {
        if self.connections.contains_key(&id) {
            return false;
        }

        self.connections.insert(id, ConnectionEntry { peer, stream });
        true
    }

    /// Remove a connection. `None` if it was not registered.
    pub fn unregister(&mut self, id: u64) -> Option<ConnectionEntry> {
        self.connections.remove(&id)
    }

    /// Entry for `id`. `None` if not registered.
    pub fn get(&self, id: u64) -> Option<&ConnectionEntry> {
        self.connections.get(&id)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// True if no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Shut down every registered socket in both directions and clear the
    /// registry. Returns how many sockets were shut down.
    ///
    /// Workers blocked on these sockets observe end-of-stream and exit.
    pub fn shutdown_all(&mut self) -> usize {
        let count = self.connections.len();

        for (id, entry) in self.connections.drain() {
            if let Err(e) = entry.stream.shutdown(Shutdown::Both) {
                tracing::debug!(id, peer = %entry.peer, error = %e, "socket already closed");
            }
        }

        count
    }
}
