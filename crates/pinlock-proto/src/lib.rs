//! Pinlock wire protocol types.
//!
//! Request and reply bodies are JSON objects whose byte-string fields are
//! hex-encoded. Inbound PIN request bodies are parsed into a tagged sum type
//! ([`PinRequest`]) before any business logic runs, so downstream code
//! matches exhaustively on the protocol variant instead of re-checking field
//! presence.
//!
//! # Protocol variants
//!
//! - **v1** (session-bound): `{ske, cke, encrypted_data,
//!   hmac_encrypted_data}` — `ske` references a live handshake session.
//! - **v2** (stateless): `{cke, encrypted_data, hmac_encrypted_data,
//!   replay_counter}` — no handshake; the 8-byte replay counter carries the
//!   state the server would otherwise hold.
//!
//! The two variants are mutually exclusive: a body carrying both `ske` and
//! `replay_counter` is rejected at parse time, before any session or crypto
//! state is touched.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod reply;
mod request;

pub use error::ProtoError;
pub use reply::{HandshakeReply, PinReply};
pub use request::{PinRequest, V1Request, V2Request};

/// Decoded length of the v2 replay counter, in bytes.
pub const REPLAY_COUNTER_LEN: usize = 8;
