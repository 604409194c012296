//! Production crypto engine for the pinlock server.
//!
//! Implements the `pinlock-core` engine seam with:
//!
//! - X25519 key agreement (fresh ephemeral contexts for v1 handshakes, a
//!   static exchange key salted by the replay counter for stateless v2)
//! - Ed25519 signatures binding ephemeral keys to the server's static
//!   identity
//! - HKDF-SHA256 key schedule with per-direction, domain-separated labels
//! - AES-256-GCM payload sealing (16-byte nonces) with an outer HMAC-SHA256
//!   tag per direction
//!
//! All functions are pure given their inputs; randomness comes exclusively
//! from the caller-supplied `Environment`, so the whole engine runs
//! deterministically under a seeded test environment.
//!
//! The 64-byte response envelope is nonce(16) ‖ ciphertext(32) ‖ tag(16) —
//! the AES-256 key length plus two block lengths, which the dispatch core
//! checks as a post-condition.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
mod engine;
mod identity;
mod schedule;

pub use client::{ClientError, ClientSession};
pub use engine::{EphemeralContext, PinEngine};
pub use identity::{KeyLoadError, load_signing_key};

// Key types appearing in the public API.
pub use ed25519_dalek::{SigningKey, VerifyingKey};
