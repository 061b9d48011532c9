//! Fuzz target for CBOR deserialization attacks
//!
//! Harden request/response decoding against hostile plaintext (MEDIUM
//! priority). Only a peer holding the session key can reach this code, but a
//! compromised or buggy client must still not crash the server.
//!
//! # Strategy
//!
//! - Deeply nested: Arrays/maps nested to arbitrary depth (stack overflow)
//! - Huge lengths: CBOR claiming massive byte/string/array lengths (memory)
//! - Random bytes: Completely arbitrary CBOR data (general malformation)
//!
//! # Invariants
//!
//! - Deserialization completes quickly (no infinite loops)
//! - Huge claimed lengths rejected (not allocated)
//! - NEVER panic on malformed CBOR
//! - Anything that decodes re-encodes and decodes to the same value

#![no_main]

use arbitrary::Arbitrary;
use fenris_proto::{codec, Request, Response};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
enum CborAttack {
    DeeplyNested { depth: u8, map: bool },
    HugeLength { claimed_len_exponent: u8 },
    RandomBytes { bytes: Vec<u8> },
}

fuzz_target!(|attack: CborAttack| {
    let inputs = match attack {
        CborAttack::DeeplyNested { depth, map } => vec![create_nested_cbor(depth as usize, map)],
        CborAttack::HugeLength { claimed_len_exponent } => {
            let exponent = u32::from(claimed_len_exponent % 33);
            let claimed_length = if exponent < 32 { 1u32 << exponent } else { u32::MAX };

            vec![
                create_huge(0x5A, claimed_length),
                create_huge(0x7A, claimed_length),
                create_huge(0x9A, claimed_length),
            ]
        }
        CborAttack::RandomBytes { bytes } => vec![bytes],
    };

    for bytes in inputs {
        if let Ok(request) = codec::decode::<Request>(&bytes) {
            let again = codec::encode(&request).expect("decoded request re-encodes");
            assert_eq!(codec::decode::<Request>(&again).expect("re-decodes"), request);
        }

        if let Ok(response) = codec::decode::<Response>(&bytes) {
            let again = codec::encode(&response).expect("decoded response re-encodes");
            assert_eq!(codec::decode::<Response>(&again).expect("re-decodes"), response);
        }
    }
});

fn create_nested_cbor(depth: usize, map: bool) -> Vec<u8> {
    let mut bytes = Vec::new();

    for _ in 0..depth {
        if map {
            bytes.extend_from_slice(&[0xA1, 0x61, b'a']);
        } else {
            bytes.push(0x81);
        }
    }
    bytes.push(0x01);

    bytes
}

/// Major-type header with a 4-byte length, followed by a few bytes of body.
fn create_huge(header: u8, claimed_length: u32) -> Vec<u8> {
    let mut bytes = vec![header];
    bytes.extend_from_slice(&claimed_length.to_be_bytes());
    bytes.extend(vec![0x01; (claimed_length as usize).min(10)]);
    bytes
}
