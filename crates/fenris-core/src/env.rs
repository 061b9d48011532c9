//! Environment abstraction for deterministic testing.
//!
//! Decouples protocol logic from system randomness. Production code uses
//! [`SystemEnv`]; tests can substitute a seeded generator so that every
//! ephemeral key and nonce is reproducible.

/// Source of randomness for handshakes and envelopes.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion)
pub trait Environment: Clone + Send + Sync + 'static {
    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Every call draws fresh bytes; two calls never intentionally return
    ///   the same output
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// Convenience for identifiers such as server connection ids.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

/// Production environment backed by the OS CSPRNG.
///
/// # Panics
///
/// Panics if the OS RNG fails. An endpoint without working cryptographic
/// randomness cannot generate keys or nonces, and continuing would reuse
/// predictable values.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - keys and nonces need entropy");
    }
}
