//! Fenris wire protocol.
//!
//! Everything that crosses the socket is defined here: the length-prefixed
//! frame format, the typed commands and results carried inside encrypted
//! frames, and the CBOR codec that turns those types into opaque bytes.
//!
//! # Wire Format
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────┐
//! │ length (u32, BE) │ payload (`length` bytes)     │
//! └──────────────────┴──────────────────────────────┘
//! ```
//!
//! The first frame in each direction carries a raw ECDH public key. Every
//! later frame carries an encrypted envelope whose plaintext is a
//! CBOR-encoded [`Request`] or [`Response`].
//!
//! This crate performs no cryptography and no socket management. It only
//! knows how to move whole frames over anything implementing
//! [`std::io::Read`] / [`std::io::Write`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod codec;
pub mod errors;
pub mod frame;
pub mod message;

pub use errors::{FrameError, ProtocolError, Result};
pub use frame::{
    FrameHeader, FrameReader, MAX_FRAME_SIZE, SEND_STALL_LIMIT, receive_frame, send_frame,
    send_frame_within,
};
pub use message::{Request, RequestType, Response, ResponseType};
