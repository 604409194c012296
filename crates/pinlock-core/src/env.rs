//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples protocol logic from system resources
//! (time, randomness). Production implementations use the system clock and
//! OS entropy; test implementations use fixed instants and seeded RNG so
//! session expiry and key generation are fully reproducible.
//!
//! # Invariants
//!
//! - Monotonicity: `now()` must never go backwards
//! - RNG quality: `random_bytes()` uses cryptographically secure entropy in
//!   production — it feeds ephemeral key generation directly

use std::time::Instant;

/// Abstract environment providing time and randomness.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Returns the current time.
    ///
    /// Values must never decrease within a single execution context.
    fn now(&self) -> Instant;

    /// Fills the provided buffer with random bytes.
    ///
    /// Production implementations MUST use OS-level cryptographic entropy
    /// (e.g. `getrandom`); test implementations may use a seeded RNG.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random fixed-size array.
    ///
    /// Convenience for key and nonce material.
    fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.random_bytes(&mut bytes);
        bytes
    }
}
