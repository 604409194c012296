//! Fuzz target for [`Dispatcher`] session lifecycle
//!
//! Prevent handshake session reuse via any interleaving of calls
//!
//! # Strategy
//!
//! - Event sequences: arbitrary interleavings of handshakes, v1 calls,
//!   v2 calls, mixed-discriminant bodies, time advances, and sweeps
//! - Engine failures: calls flagged to fail inside the crypto engine,
//!   checking that failed calls still burn their session
//! - Expiry: time advanced past the session lifetime between issue and use
//!
//! # Invariants
//!
//! - A session id succeeds at most once; any second v1 call with the same
//!   id MUST return `SessionNotFound`
//! - An expired session MUST return `SessionNotFound`, never a stale context
//! - A v1 call that fails inside the engine still consumes the session
//! - v2 calls never touch the session table
//! - Mixed-discriminant bodies reject with `ProtocolViolation` and leave
//!   the table untouched
//! - NEVER panic on any event sequence

#![no_main]

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pinlock_core::{
    CryptoEngine, DispatchError, Dispatcher, EngineError, PinOperation, PinStore, PinStoreError,
    REPLAY_COUNTER_LEN,
};

const LIFETIME_SECS: u64 = 300;

/// Engine stub: unique ephemeral ids, engine failure selected by the first
/// byte of `cke`.
struct FuzzEngine {
    counter: AtomicU64,
}

const FAIL_MARKER: u8 = 0xFF;

impl CryptoEngine for FuzzEngine {
    type Ephemeral = u64;

    fn begin_handshake(&self) -> Result<(Self::Ephemeral, Vec<u8>, Vec<u8>), EngineError> {
        let id = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut pubkey = [0u8; 32];
        pubkey[..8].copy_from_slice(&id.to_be_bytes());
        Ok((id, pubkey.to_vec(), vec![0u8; 64]))
    }

    fn stateless_context(
        &self,
        _replay_counter: &[u8; REPLAY_COUNTER_LEN],
        _cke: &[u8],
    ) -> Result<Self::Ephemeral, EngineError> {
        Ok(u64::MAX)
    }

    fn call_with_payload(
        &self,
        _ephemeral: Self::Ephemeral,
        cke: &[u8],
        _encrypted_data: &[u8],
        _hmac: &[u8],
        _op: PinOperation,
        _store: &dyn PinStore,
    ) -> Result<(Vec<u8>, Vec<u8>), EngineError> {
        if cke.first() == Some(&FAIL_MARKER) {
            return Err(EngineError::Failure("flagged call".to_string()));
        }
        Ok((vec![0u8; 64], vec![0u8; 32]))
    }
}

struct FuzzStore;

impl PinStore for FuzzStore {
    fn get_aes_key(&self, _pin_id: &[u8], _pin_secret: &[u8]) -> Result<[u8; 32], PinStoreError> {
        Ok([0u8; 32])
    }

    fn set_pin(
        &self,
        _pin_id: &[u8],
        _pin_secret: &[u8],
        _entropy: &[u8],
    ) -> Result<[u8; 32], PinStoreError> {
        Ok([0u8; 32])
    }
}

#[derive(Debug, Clone, Arbitrary)]
enum DispatchEvent {
    StartHandshake,
    /// v1 call against a previously issued session id.
    CallIssued { index: u8, set_pin: bool, engine_fail: bool },
    /// v1 call against an id the server never issued.
    CallUnknown { ske: [u8; 8] },
    CallStateless { counter: [u8; REPLAY_COUNTER_LEN], engine_fail: bool },
    /// Body carrying both discriminants.
    CallMixed { index: u8 },
    Advance { secs: u16 },
    Sweep,
}

fn body(ske: Option<&str>, counter: Option<&[u8]>, engine_fail: bool) -> Vec<u8> {
    let cke = if engine_fail { [FAIL_MARKER; 32] } else { [1u8; 32] };
    let mut map = serde_json::Map::new();
    if let Some(ske) = ske {
        map.insert("ske".into(), ske.into());
    }
    if let Some(counter) = counter {
        map.insert("replay_counter".into(), hex::encode(counter).into());
    }
    map.insert("cke".into(), hex::encode(cke).into());
    map.insert("encrypted_data".into(), hex::encode([2u8; 96]).into());
    map.insert("hmac_encrypted_data".into(), hex::encode([3u8; 32]).into());
    serde_json::Value::Object(map).to_string().into_bytes()
}

fuzz_target!(|events: Vec<DispatchEvent>| {
    let dispatcher = Dispatcher::new(
        FuzzEngine { counter: AtomicU64::new(0) },
        Duration::from_secs(LIFETIME_SECS),
    );
    let store = FuzzStore;

    let base = Instant::now();
    let mut offset = Duration::ZERO;

    // Issue time per session id; `None` once consumed.
    let mut issued: Vec<(String, Option<Duration>)> = Vec::new();

    for event in events {
        let now = base + offset;

        match event {
            DispatchEvent::StartHandshake => {
                let reply = dispatcher.start_handshake(now).expect("stub engine cannot fail");
                issued.push((reply.ske, Some(offset)));
            },

            DispatchEvent::CallIssued { index, set_pin, engine_fail } => {
                if issued.is_empty() {
                    continue;
                }
                let slot = index as usize % issued.len();
                let (ske, state) = issued[slot].clone();

                let live = matches!(
                    state,
                    Some(at) if offset.saturating_sub(at) < Duration::from_secs(LIFETIME_SECS)
                );
                let op = if set_pin { PinOperation::SetPin } else { PinOperation::GetKey };
                let result =
                    dispatcher.complete_call(op, &body(Some(&ske), None, engine_fail), &store, now);

                if live {
                    match result {
                        Ok(_) => assert!(!engine_fail),
                        Err(DispatchError::CryptoEngineFailure(_)) => assert!(engine_fail),
                        Err(other) => panic!("live session {ske} rejected with {other:?}"),
                    }
                } else {
                    assert!(
                        matches!(result, Err(DispatchError::SessionNotFound)),
                        "dead session {ske} yielded {result:?}"
                    );
                }

                // Consumed either way: success, engine failure, or expiry.
                issued[slot].1 = None;
            },

            DispatchEvent::CallUnknown { ske } => {
                let result = dispatcher.complete_call(
                    PinOperation::GetKey,
                    &body(Some(&hex::encode(ske)), None, false),
                    &store,
                    now,
                );
                if !issued.iter().any(|(id, _)| *id == hex::encode(ske)) {
                    assert!(matches!(result, Err(DispatchError::SessionNotFound)));
                }
            },

            DispatchEvent::CallStateless { counter, engine_fail } => {
                let before = dispatcher.live_sessions();
                let result = dispatcher.complete_call(
                    PinOperation::GetKey,
                    &body(None, Some(&counter), engine_fail),
                    &store,
                    now,
                );
                match result {
                    Ok(_) => assert!(!engine_fail),
                    Err(DispatchError::CryptoEngineFailure(_)) => assert!(engine_fail),
                    Err(other) => panic!("stateless call rejected with {other:?}"),
                }
                assert_eq!(dispatcher.live_sessions(), before);
            },

            DispatchEvent::CallMixed { index } => {
                let ske = if issued.is_empty() {
                    "00".to_string()
                } else {
                    issued[index as usize % issued.len()].0.clone()
                };
                let before = dispatcher.live_sessions();
                let result = dispatcher.complete_call(
                    PinOperation::GetKey,
                    &body(Some(&ske), Some(&[0u8; REPLAY_COUNTER_LEN]), false),
                    &store,
                    now,
                );
                assert!(matches!(result, Err(DispatchError::ProtocolViolation(_))));
                assert_eq!(dispatcher.live_sessions(), before);
            },

            DispatchEvent::Advance { secs } => {
                offset += Duration::from_secs(u64::from(secs));
            },

            DispatchEvent::Sweep => {
                dispatcher.sweep_expired(now);
            },
        }
    }

    // Whatever happened, the table never holds more ids than were issued
    // and never consumed.
    let unconsumed: HashMap<&str, Duration> = issued
        .iter()
        .filter_map(|(id, state)| state.map(|at| (id.as_str(), at)))
        .collect();
    assert!(dispatcher.live_sessions() <= unconsumed.len());
});
