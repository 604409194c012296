//! Dispatch error taxonomy.

use thiserror::Error;

use pinlock_proto::ProtoError;

use crate::{engine::EngineError, session::SessionError};

/// Errors surfaced to the transport boundary for a failed request.
///
/// Every failure is terminal for its request; this core performs no
/// retries. The variants are the complete externally visible taxonomy —
/// transports map them to status codes and must not expose anything beyond
/// the documented kind.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Body is not parseable structured data.
    #[error("malformed request: {0}")]
    MalformedRequest(ProtoError),

    /// Mutually-exclusive-field rule broken, or a required field missing or
    /// ill-formed.
    #[error("protocol violation: {0}")]
    ProtocolViolation(ProtoError),

    /// Referenced session id absent, expired, or already consumed.
    #[error("session not found")]
    SessionNotFound,

    /// Crypto engine output failed the post-condition length check, or
    /// payload integrity verification failed inside the engine.
    #[error("integrity error")]
    IntegrityError,

    /// Failure surfaced by the external key-agreement or PIN-store call.
    #[error("crypto engine failure: {0}")]
    CryptoEngineFailure(String),
}

impl DispatchError {
    /// Stable machine-readable kind for wire error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedRequest(_) => "malformed_request",
            Self::ProtocolViolation(_) => "protocol_violation",
            Self::SessionNotFound => "session_not_found",
            Self::IntegrityError => "integrity_error",
            Self::CryptoEngineFailure(_) => "crypto_engine_failure",
        }
    }
}

impl From<ProtoError> for DispatchError {
    fn from(err: ProtoError) -> Self {
        if err.is_malformed() {
            Self::MalformedRequest(err)
        } else {
            Self::ProtocolViolation(err)
        }
    }
}

impl From<SessionError> for DispatchError {
    fn from(_: SessionError) -> Self {
        Self::SessionNotFound
    }
}

impl From<EngineError> for DispatchError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Integrity => Self::IntegrityError,
            EngineError::Failure(reason) => Self::CryptoEngineFailure(reason),
        }
    }
}
