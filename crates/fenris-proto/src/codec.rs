//! CBOR payload codec.
//!
//! Messages are serialized with serde into CBOR. CBOR is self-describing and
//! needs no code generation, so new optional fields can be added without
//! breaking older peers (see the `#[serde(default)]` fields in
//! [`crate::message`]).

use serde::{Serialize, de::DeserializeOwned};

use crate::errors::{ProtocolError, Result};

/// Serialize `message` into CBOR bytes.
///
/// # Errors
///
/// - `ProtocolError::Encode` if serde rejects the value
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(message, &mut buf)
        .map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Deserialize CBOR bytes into `T`.
///
/// # Errors
///
/// - `ProtocolError::Decode` on malformed CBOR or a shape mismatch
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}
