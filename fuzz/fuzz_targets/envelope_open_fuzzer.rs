//! Fuzz target for envelope authentication
//!
//! # Strategy
//!
//! - Random bytes: arbitrary envelopes under an arbitrary key
//! - Bit flips: a genuine envelope with one modified byte
//!
//! # Invariants
//!
//! - `open` NEVER panics
//! - Envelopes shorter than nonce + tag return `InvalidEnvelope`
//! - Any modification of a genuine envelope returns `AuthenticationFailed`
//! - Unmodified envelopes round-trip

#![no_main]

use arbitrary::Arbitrary;
use fenris_crypto::{open, seal, CryptoError, SessionKey, NONCE_SIZE, TAG_SIZE};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
enum EnvelopeAttack {
    RandomBytes { key: [u8; 32], envelope: Vec<u8> },
    BitFlip { key: [u8; 32], nonce: [u8; NONCE_SIZE], plaintext: Vec<u8>, index: usize, mask: u8 },
}

fuzz_target!(|attack: EnvelopeAttack| {
    match attack {
        EnvelopeAttack::RandomBytes { key, envelope } => {
            let result = open(&SessionKey::from_bytes(key), &envelope);

            if envelope.len() < NONCE_SIZE + TAG_SIZE {
                assert!(matches!(result, Err(CryptoError::InvalidEnvelope { .. })));
            }
        }

        EnvelopeAttack::BitFlip { key, nonce, plaintext, index, mask } => {
            let key = SessionKey::from_bytes(key);
            let mut envelope = seal(&key, &plaintext, nonce).expect("seal must succeed");

            assert_eq!(open(&key, &envelope).expect("genuine envelope opens"), plaintext);

            if mask != 0 {
                let index = index % envelope.len();
                envelope[index] ^= mask;
                assert_eq!(open(&key, &envelope), Err(CryptoError::AuthenticationFailed));
            }
        }
    }
});
