//! Inbound PIN request parsing.
//!
//! The raw body is deserialized into an untyped field set first, then
//! validated into the [`PinRequest`] sum type. All structural rules — field
//! exclusivity, required fields, hex decoding, the 8-byte replay counter —
//! are enforced here, so the dispatcher only ever sees a well-formed
//! variant.

use serde::Deserialize;

use crate::{ProtoError, REPLAY_COUNTER_LEN};

/// Untyped view of the request body, straight out of serde.
///
/// Every field is optional at this stage; presence rules are checked during
/// validation so that a missing field surfaces as a protocol violation
/// rather than a generic deserialization error.
#[derive(Debug, Deserialize)]
struct RawPinRequest {
    ske: Option<String>,
    cke: Option<String>,
    encrypted_data: Option<String>,
    hmac_encrypted_data: Option<String>,
    replay_counter: Option<String>,
}

/// A session-bound (v1) PIN request.
#[derive(Clone, PartialEq, Eq)]
pub struct V1Request {
    /// Hex id of the handshake session to consume (the server ephemeral
    /// public key as returned by the handshake call).
    pub ske: String,
    /// Client ephemeral public key.
    pub cke: Vec<u8>,
    /// Encrypted PIN payload.
    pub encrypted_data: Vec<u8>,
    /// Integrity tag over the encrypted payload.
    pub hmac_encrypted_data: Vec<u8>,
}

/// A stateless (v2) PIN request.
#[derive(Clone, PartialEq, Eq)]
pub struct V2Request {
    /// Client ephemeral public key.
    pub cke: Vec<u8>,
    /// Encrypted PIN payload.
    pub encrypted_data: Vec<u8>,
    /// Integrity tag over the encrypted payload.
    pub hmac_encrypted_data: Vec<u8>,
    /// Replay counter; carries the per-request state v1 keeps in a session.
    pub replay_counter: [u8; REPLAY_COUNTER_LEN],
}

/// A validated inbound PIN request, discriminated by protocol variant.
#[derive(Clone, PartialEq, Eq)]
pub enum PinRequest {
    /// Session-bound variant; `ske` must reference a live session.
    V1(V1Request),
    /// Stateless variant; no session-table interaction.
    V2(V2Request),
}

impl PinRequest {
    /// Parse and validate a raw request body.
    ///
    /// # Errors
    ///
    /// [`ProtoError::Malformed`] if the body is not JSON; any other variant
    /// if the body is structurally invalid (mixed discriminants, missing
    /// fields, bad hex, wrong-length replay counter).
    pub fn parse(body: &[u8]) -> Result<Self, ProtoError> {
        let raw: RawPinRequest = serde_json::from_slice(body)?;

        if raw.ske.is_some() && raw.replay_counter.is_some() {
            return Err(ProtoError::MutuallyExclusive);
        }

        let cke = decode_required(raw.cke.as_deref(), "cke")?;
        let encrypted_data = decode_required(raw.encrypted_data.as_deref(), "encrypted_data")?;
        let hmac_encrypted_data =
            decode_required(raw.hmac_encrypted_data.as_deref(), "hmac_encrypted_data")?;

        if let Some(counter_hex) = raw.replay_counter {
            let counter = decode_field(&counter_hex, "replay_counter")?;
            let replay_counter: [u8; REPLAY_COUNTER_LEN] = counter
                .try_into()
                .map_err(|bad: Vec<u8>| ProtoError::ReplayCounterLength(bad.len()))?;
            return Ok(Self::V2(V2Request {
                cke,
                encrypted_data,
                hmac_encrypted_data,
                replay_counter,
            }));
        }

        let ske = raw.ske.ok_or(ProtoError::MissingField("ske"))?;
        Ok(Self::V1(V1Request { ske, cke, encrypted_data, hmac_encrypted_data }))
    }
}

fn decode_required(value: Option<&str>, field: &'static str) -> Result<Vec<u8>, ProtoError> {
    let value = value.ok_or(ProtoError::MissingField(field))?;
    decode_field(value, field)
}

fn decode_field(value: &str, field: &'static str) -> Result<Vec<u8>, ProtoError> {
    hex::decode(value).map_err(|_| ProtoError::InvalidHex { field })
}

// Key material flows through these types; Debug shows lengths only.
impl std::fmt::Debug for PinRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V1(req) => req.fmt(f),
            Self::V2(req) => req.fmt(f),
        }
    }
}

impl std::fmt::Debug for V1Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V1Request")
            .field("ske", &self.ske)
            .field("cke", &format_args!("<{} bytes>", self.cke.len()))
            .field("encrypted_data", &format_args!("<{} bytes>", self.encrypted_data.len()))
            .field(
                "hmac_encrypted_data",
                &format_args!("<{} bytes>", self.hmac_encrypted_data.len()),
            )
            .finish()
    }
}

impl std::fmt::Debug for V2Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V2Request")
            .field("cke", &format_args!("<{} bytes>", self.cke.len()))
            .field("encrypted_data", &format_args!("<{} bytes>", self.encrypted_data.len()))
            .field(
                "hmac_encrypted_data",
                &format_args!("<{} bytes>", self.hmac_encrypted_data.len()),
            )
            .field("replay_counter", &hex::encode(self.replay_counter))
            .finish()
    }
}
