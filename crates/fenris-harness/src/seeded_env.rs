//! Seeded Environment implementation for deterministic testing.

use std::sync::{Arc, Mutex, PoisonError};

use fenris_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Environment whose randomness comes from a seeded ChaCha20 stream.
///
/// Clones share one generator, so a connection and the code that created it
/// draw from the same sequence. Two `SeededEnv`s built from the same seed
/// produce identical bytes.
///
/// Never use outside tests: every key and nonce is predictable.
#[derive(Clone)]
pub struct SeededEnv {
    /// Wrapped in `Arc<Mutex<>>` so clones advance the same sequence
    rng: Arc<Mutex<ChaCha20Rng>>,
}

impl SeededEnv {
    /// Create a SeededEnv with the default seed (0)
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Create a SeededEnv with a specific seed
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))) }
    }
}

impl Default for SeededEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SeededEnv {
    fn random_bytes(&self, dest: &mut [u8]) {
        // The generator has no invariants a panicking holder could break.
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(dest);
    }
}
