//! Client
//!
//! Connection manager for talking to a Fenris server: connect, exchange typed
//! requests and responses over the secure channel, disconnect.
//!
//! # Components
//!
//! - [`Client`]: request/response API over one [`fenris_core::Connection`]
//! - [`ConnectionError`]: every failure a client call can report

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;

pub use client::Client;
pub use fenris_core::{
    ConnectionConfig, ConnectionError, ConnectionState, Environment, SystemEnv,
};
pub use fenris_proto::{Request, RequestType, Response, ResponseType};
