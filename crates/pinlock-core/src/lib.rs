//! Pinlock protocol core.
//!
//! Sans-IO session lifecycle and request dispatch for a PIN-unlock server:
//! clients prove knowledge of a PIN over an ECDH-established channel and
//! receive an AES key, without the PIN or key ever being persisted or sent
//! in the clear.
//!
//! ## Architecture
//!
//! ```text
//! pinlock-core
//!   ├─ Environment      (time + randomness seam)
//!   ├─ SessionManager   (ephemeral handshake table, at-most-once consume)
//!   ├─ Dispatcher       (v1/v2 classification + crypto completion)
//!   ├─ CryptoEngine     (trait seam: key agreement, seal/open, signing)
//!   └─ PinStore         (trait seam: PIN-gated AES key storage)
//! ```
//!
//! Nothing in this crate performs I/O or touches the system clock: callers
//! inject `now` per operation and the [`env::Environment`] trait supplies
//! randomness, which keeps every invariant here testable deterministically.
//!
//! ## Security invariants
//!
//! - A handshake session is consumed at most once; a replayed v1 request
//!   always fails on the second attempt.
//! - The v1 and v2 discriminant fields are mutually exclusive; mixing them
//!   is a hard failure before any state is touched.
//! - Session lifetime is bounded; expiry is swept cooperatively on request
//!   arrival, never by a background timer.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dispatch;
pub mod engine;
pub mod env;
pub mod error;
pub mod session;

pub use dispatch::Dispatcher;
pub use engine::{CryptoEngine, EngineError, PinOperation, PinStore, PinStoreError};
pub use env::Environment;
pub use error::DispatchError;
pub use session::{SessionError, SessionManager};

pub use pinlock_proto::REPLAY_COUNTER_LEN;

/// AES-256 key length in bytes.
pub const AES_KEY_LEN_256: usize = 32;

/// AES cipher block length in bytes.
pub const AES_BLOCK_LEN: usize = 16;

/// Expected length of the encrypted AES key returned by the crypto engine:
/// the key itself plus two block lengths of envelope overhead.
pub const ENCRYPTED_KEY_LEN: usize = AES_KEY_LEN_256 + 2 * AES_BLOCK_LEN;

/// Default handshake session lifetime, in seconds.
pub const DEFAULT_SESSION_LIFETIME_SECS: u64 = 300;
