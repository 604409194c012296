//! Fuzz target for [`PinRequest`] body parsing
//!
//! The request parser sits directly on the network boundary: every byte a
//! client sends passes through it before any session or crypto state is
//! touched.
//!
//! # Strategy
//!
//! - Raw bytes: arbitrary garbage, truncated JSON, deep nesting
//! - Structured bodies: valid JSON with arbitrary field presence and
//!   arbitrary hex payload lengths, including both discriminants at once
//!
//! # Invariants
//!
//! - NEVER panic, whatever the body
//! - `ske` and `replay_counter` together MUST reject with `MutuallyExclusive`,
//!   before any other field is even looked at
//! - A parsed V2 request implies the counter hex decoded to exactly 8 bytes
//! - A parsed V1 request implies `replay_counter` was absent

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pinlock_proto::{PinRequest, ProtoError, REPLAY_COUNTER_LEN};

#[derive(Debug, Arbitrary)]
enum FuzzInput {
    /// Completely arbitrary body bytes.
    Raw(Vec<u8>),
    /// Structurally valid JSON with fuzzed field presence and contents.
    Structured {
        ske: Option<Vec<u8>>,
        replay_counter: Option<Vec<u8>>,
        cke: Option<Vec<u8>>,
        encrypted_data: Option<Vec<u8>>,
        hmac_encrypted_data: Option<Vec<u8>>,
    },
}

fuzz_target!(|input: FuzzInput| {
    match input {
        FuzzInput::Raw(body) => {
            let _ = PinRequest::parse(&body);
        },

        FuzzInput::Structured { ske, replay_counter, cke, encrypted_data, hmac_encrypted_data } => {
            let both_present = ske.is_some() && replay_counter.is_some();
            let counter_len = replay_counter.as_ref().map(Vec::len);

            let mut body = serde_json::Map::new();
            if let Some(bytes) = &ske {
                body.insert("ske".into(), hex::encode(bytes).into());
            }
            if let Some(bytes) = &replay_counter {
                body.insert("replay_counter".into(), hex::encode(bytes).into());
            }
            if let Some(bytes) = &cke {
                body.insert("cke".into(), hex::encode(bytes).into());
            }
            if let Some(bytes) = &encrypted_data {
                body.insert("encrypted_data".into(), hex::encode(bytes).into());
            }
            if let Some(bytes) = &hmac_encrypted_data {
                body.insert("hmac_encrypted_data".into(), hex::encode(bytes).into());
            }

            let encoded = serde_json::Value::Object(body).to_string();
            let result = PinRequest::parse(encoded.as_bytes());

            if both_present {
                assert!(
                    matches!(result, Err(ProtoError::MutuallyExclusive)),
                    "mixed discriminants accepted: {result:?}"
                );
                return;
            }

            match result {
                Ok(PinRequest::V1(_)) => {
                    assert!(ske.is_some());
                    assert!(replay_counter.is_none());
                },
                Ok(PinRequest::V2(req)) => {
                    assert_eq!(counter_len, Some(REPLAY_COUNTER_LEN));
                    assert_eq!(req.replay_counter.len(), REPLAY_COUNTER_LEN);
                },
                Err(_) => {},
            }
        },
    }
});
