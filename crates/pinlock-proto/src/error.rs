//! Wire protocol error types.

use thiserror::Error;

/// Errors raised while parsing an inbound request body.
///
/// [`ProtoError::Malformed`] means the body is not parseable JSON at all;
/// every other variant is a structural protocol violation in an otherwise
/// well-formed body. Callers map the two classes to distinct error kinds.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Body is not parseable structured data.
    #[error("malformed request body: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Both `ske` and `replay_counter` are present.
    ///
    /// The session-bound and stateless variants must never be mixed; a body
    /// carrying both discriminants is rejected outright.
    #[error("ske and replay_counter are mutually exclusive")]
    MutuallyExclusive,

    /// A required field is missing.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A byte-string field is not valid hex.
    #[error("field {field} is not valid hex")]
    InvalidHex {
        /// Name of the offending field.
        field: &'static str,
    },

    /// The decoded replay counter is not exactly 8 bytes.
    #[error("replay_counter must decode to 8 bytes, got {0}")]
    ReplayCounterLength(usize),
}

impl ProtoError {
    /// True for bodies that failed to parse as JSON at all, as opposed to
    /// well-formed bodies that violate the protocol structure.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}
