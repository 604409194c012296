//! Server static identity.
//!
//! The server's long-term identity is a single 32-byte Ed25519 seed stored
//! as hex in a file. The signing key authenticates handshake ephemerals;
//! the X25519 exchange secret used by the stateless v2 variant is derived
//! from the same seed, so one key file provisions both.

use std::path::Path;

use ed25519_dalek::SigningKey;
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;
use x25519_dalek::StaticSecret;

/// Domain-separation label for the derived X25519 exchange secret.
const EXCHANGE_INFO: &[u8] = b"pinlock static exchange v1";

/// Errors loading or deriving the server's static key material.
///
/// Any of these at startup is fatal: the process must refuse to serve.
#[derive(Debug, Error)]
pub enum KeyLoadError {
    /// Key file could not be read.
    #[error("cannot read key file: {0}")]
    Io(#[from] std::io::Error),

    /// Key file content is not valid hex.
    #[error("key file is not valid hex")]
    InvalidHex,

    /// Decoded key is not exactly 32 bytes.
    #[error("key must be 32 bytes, got {0}")]
    InvalidLength(usize),

    /// HKDF expansion of the exchange secret failed.
    #[error("key derivation failed")]
    Derivation,
}

/// Load and validate the server's static signing key.
///
/// # Errors
///
/// Any [`KeyLoadError`] if the file is missing, unreadable, or does not
/// contain a 32-byte hex seed.
pub fn load_signing_key(path: &Path) -> Result<SigningKey, KeyLoadError> {
    let text = std::fs::read_to_string(path)?;
    let bytes = hex::decode(text.trim()).map_err(|_| KeyLoadError::InvalidHex)?;
    let seed: [u8; 32] =
        bytes.try_into().map_err(|bad: Vec<u8>| KeyLoadError::InvalidLength(bad.len()))?;
    Ok(SigningKey::from_bytes(&seed))
}

/// Derive the static X25519 exchange secret from the signing seed.
pub(crate) fn derive_exchange_secret(signing: &SigningKey) -> Result<StaticSecret, KeyLoadError> {
    let hk = Hkdf::<Sha256>::new(None, signing.as_bytes());
    let mut okm = [0u8; 32];
    hk.expand(EXCHANGE_INFO, &mut okm).map_err(|_| KeyLoadError::Derivation)?;
    Ok(StaticSecret::from(okm))
}
