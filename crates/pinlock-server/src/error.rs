//! Server error types.

use thiserror::Error;

use pinlock_crypto::KeyLoadError;

/// Errors that can occur in the server runtime.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Static key could not be loaded or validated at startup.
    #[error("static key error: {0}")]
    StaticKey(#[from] KeyLoadError),

    /// Transport/network error.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// HTTP request could not be read or violated adapter limits.
    #[error("http error: {0}")]
    Http(String),
}
