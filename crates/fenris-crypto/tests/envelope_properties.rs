//! Property-based tests for the key exchange and message envelope
//!
//! Verifies the security properties that must hold for ALL inputs: round-trip
//! identity, key separation, and tamper detection.

use fenris_crypto::{
    CryptoError, EphemeralKeypair, NONCE_SIZE, SCALAR_SIZE, SESSION_KEY_SIZE, SessionKey, open,
    seal,
};
use proptest::prelude::*;

fn arbitrary_key() -> impl Strategy<Value = [u8; SESSION_KEY_SIZE]> {
    any::<[u8; SESSION_KEY_SIZE]>()
}

fn arbitrary_plaintext() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..2048)
}

#[test]
fn prop_seal_open_roundtrip() {
    proptest!(|(key in arbitrary_key(), nonce in any::<[u8; NONCE_SIZE]>(), plaintext in arbitrary_plaintext())| {
        let key = SessionKey::from_bytes(key);
        let envelope = seal(&key, &plaintext, nonce).expect("seal should succeed");

        // PROPERTY: open(seal(p)) == p
        prop_assert_eq!(open(&key, &envelope).expect("open should succeed"), plaintext);
    });
}

#[test]
fn prop_wrong_key_fails() {
    proptest!(|(k1 in arbitrary_key(), k2 in arbitrary_key(), nonce in any::<[u8; NONCE_SIZE]>(), plaintext in arbitrary_plaintext())| {
        prop_assume!(k1 != k2);

        let envelope = seal(&SessionKey::from_bytes(k2), &plaintext, nonce).expect("seal should succeed");

        // PROPERTY: an envelope sealed under k2 never opens under k1
        prop_assert_eq!(
            open(&SessionKey::from_bytes(k1), &envelope),
            Err(CryptoError::AuthenticationFailed)
        );
    });
}

#[test]
fn prop_bit_flip_detected() {
    proptest!(|(key in arbitrary_key(), plaintext in arbitrary_plaintext(), flip in any::<prop::sample::Index>(), bit in 0u8..8)| {
        let key = SessionKey::from_bytes(key);
        let mut envelope = seal(&key, &plaintext, [0x5A; NONCE_SIZE]).expect("seal should succeed");

        let index = flip.index(envelope.len());
        envelope[index] ^= 1 << bit;

        // PROPERTY: any single-bit change is rejected, never yields plaintext
        prop_assert_eq!(open(&key, &envelope), Err(CryptoError::AuthenticationFailed));
    });
}

#[test]
fn prop_key_agreement_is_symmetric() {
    proptest!(|(seed_a in any::<[u8; SCALAR_SIZE]>(), seed_b in any::<[u8; SCALAR_SIZE]>())| {
        let (Ok(alice), Ok(bob)) = (
            EphemeralKeypair::from_scalar_bytes(&seed_a),
            EphemeralKeypair::from_scalar_bytes(&seed_b),
        ) else {
            // Invalid scalars are rejected up front; nothing to agree on
            return Ok(());
        };

        let alice_public = alice.public_key().to_vec();
        let bob_public = bob.public_key().to_vec();

        let alice_key = alice.agree(&bob_public).expect("bob's key is valid");
        let bob_key = bob.agree(&alice_public).expect("alice's key is valid");

        // PROPERTY: both ends derive identical session keys
        prop_assert_eq!(alice_key.as_bytes(), bob_key.as_bytes());
    });
}

#[test]
fn prop_fresh_keypairs_give_fresh_session_keys() {
    proptest!(|(seeds in prop::collection::vec(any::<[u8; SCALAR_SIZE]>(), 3..6))| {
        let peer = EphemeralKeypair::from_scalar_bytes(&[0x11; SCALAR_SIZE]).expect("valid scalar");
        let peer_public = peer.public_key().to_vec();

        let mut unique_seeds = seeds;
        unique_seeds.sort_unstable();
        unique_seeds.dedup();

        let keys: Vec<[u8; SESSION_KEY_SIZE]> = unique_seeds
            .iter()
            .filter_map(|seed| EphemeralKeypair::from_scalar_bytes(seed).ok())
            .map(|kp| *kp.agree(&peer_public).expect("peer key is valid").as_bytes())
            .collect();

        // PROPERTY: distinct ephemeral scalars never collide on a session key
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                prop_assert_ne!(a, b);
            }
        }
    });
}
