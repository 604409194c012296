//! Outbound reply payloads.
//!
//! Reply fields are public wire data (already-encrypted blobs or public
//! keys), so plain `Debug` derives are fine here; redaction only matters on
//! the request side.

use serde::{Deserialize, Serialize};

/// Reply to a handshake call: the signed server ephemeral public key.
///
/// `ske` doubles as the session id for the follow-up v1 PIN call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeReply {
    /// Server ephemeral public key, hex-encoded.
    pub ske: String,
    /// Signature over the ephemeral public key under the server's static
    /// signing key, hex-encoded.
    pub sig: String,
}

impl HandshakeReply {
    /// Build a reply from raw key and signature bytes.
    pub fn new(pubkey: &[u8], sig: &[u8]) -> Self {
        Self { ske: hex::encode(pubkey), sig: hex::encode(sig) }
    }
}

/// Reply to a PIN call: the re-encrypted AES key and its integrity tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinReply {
    /// Encrypted AES key, hex-encoded. Always decodes to 64 bytes.
    pub encrypted_key: String,
    /// HMAC over the encrypted key, hex-encoded.
    pub hmac: String,
}

impl PinReply {
    /// Build a reply from raw ciphertext and tag bytes.
    pub fn new(encrypted_key: &[u8], hmac: &[u8]) -> Self {
        Self { encrypted_key: hex::encode(encrypted_key), hmac: hex::encode(hmac) }
    }
}
