//! Trait seams to the cryptographic engine and the PIN store.
//!
//! The dispatcher treats both as opaque collaborators: the engine performs
//! key agreement, integrity verification, and payload sealing; the store
//! maps a proven PIN secret to an AES key and enforces its own attempt
//! limits. Neither trait has any session concept — session state lives
//! entirely in [`crate::SessionManager`].

use thiserror::Error;

use pinlock_proto::REPLAY_COUNTER_LEN;

/// The action to perform once the shared secret is established.
///
/// Selected by the caller context (which endpoint was hit), never by
/// request data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOperation {
    /// Retrieve the AES key stored for an existing PIN.
    GetKey,
    /// Establish a new PIN and store a fresh AES key for it.
    SetPin,
}

/// Errors surfaced by a [`CryptoEngine`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// Integrity verification failed (HMAC mismatch or AEAD failure).
    #[error("payload integrity check failed")]
    Integrity,

    /// Any other engine or store failure (wrong PIN, bad key material,
    /// store lockout). Opaque to the dispatch layer beyond "failed".
    #[error("crypto engine failure: {0}")]
    Failure(String),
}

impl From<PinStoreError> for EngineError {
    fn from(err: PinStoreError) -> Self {
        Self::Failure(err.to_string())
    }
}

/// Errors surfaced by a [`PinStore`].
#[derive(Debug, Error)]
pub enum PinStoreError {
    /// No record exists for this PIN identity.
    #[error("unknown pin")]
    UnknownPin,

    /// The supplied PIN secret does not match the stored record.
    ///
    /// Repeated failures count toward the store's lockout policy.
    #[error("bad pin")]
    BadPin,
}

/// PIN-gated AES key storage.
///
/// Both operations are pure from the dispatcher's viewpoint; attempt
/// counting and lockout are internal store policy.
pub trait PinStore: Send + Sync {
    /// Return the AES key stored for `pin_id`, given proof of the PIN.
    fn get_aes_key(&self, pin_id: &[u8], pin_secret: &[u8]) -> Result<[u8; 32], PinStoreError>;

    /// Establish (or replace) the PIN record and return a fresh AES key,
    /// mixing caller-supplied entropy into the new key.
    fn set_pin(
        &self,
        pin_id: &[u8],
        pin_secret: &[u8],
        entropy: &[u8],
    ) -> Result<[u8; 32], PinStoreError>;
}

/// The cryptographic engine contract.
///
/// An `Ephemeral` is the server-side key-agreement context for one request:
/// v1 contexts are created at handshake time and parked in the session
/// table; v2 contexts are derived statelessly from the request itself.
/// `call_with_payload` consumes the context, enforcing at the type level
/// that a context performs at most one key agreement.
pub trait CryptoEngine: Send + Sync {
    /// Server-side ephemeral key-agreement context.
    type Ephemeral: Send + 'static;

    /// Generate a fresh ephemeral context and sign its public key under the
    /// server's static key.
    ///
    /// Returns `(context, public key bytes, signature bytes)`.
    fn begin_handshake(&self) -> Result<(Self::Ephemeral, Vec<u8>, Vec<u8>), EngineError>;

    /// Build a stateless (v2) context from the replay counter and the
    /// client ephemeral public key. No session state is created.
    fn stateless_context(
        &self,
        replay_counter: &[u8; REPLAY_COUNTER_LEN],
        cke: &[u8],
    ) -> Result<Self::Ephemeral, EngineError>;

    /// Complete a PIN call: agree on keys with `cke`, verify `hmac` over
    /// `encrypted_data`, decrypt the PIN payload, run `op` against `store`,
    /// and re-encrypt the resulting AES key under the session keys.
    ///
    /// Returns `(encrypted_key, hmac)` for the reply.
    fn call_with_payload(
        &self,
        ephemeral: Self::Ephemeral,
        cke: &[u8],
        encrypted_data: &[u8],
        hmac: &[u8],
        op: PinOperation,
        store: &dyn PinStore,
    ) -> Result<(Vec<u8>, Vec<u8>), EngineError>;
}
