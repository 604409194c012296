//! Protocol dispatcher.
//!
//! Classifies an inbound PIN request, validates it, and executes the
//! cryptographic completion:
//!
//! 1. Parse the body into the v1/v2 sum type (structural validation happens
//!    there, before any state is touched).
//! 2. v2: build a stateless engine context from the replay counter and
//!    `cke` — no session-table interaction.
//! 3. v1: consume the referenced session (at-most-once; a failed
//!    consumption still burns the session).
//! 4. Invoke the engine's payload completion with the selected
//!    [`PinOperation`].
//! 5. Check the returned encrypted key against the expected fixed length —
//!    a sanity check on the engine's own contract, not attacker data.
//!
//! Presence of both discriminants, or neither plus no resolvable session,
//! is always a hard failure, never a silent fallback. No retries: every
//! failure is terminal for its request.

use std::time::{Duration, Instant};

use pinlock_proto::{HandshakeReply, PinReply, PinRequest};

use crate::{
    ENCRYPTED_KEY_LEN,
    engine::{CryptoEngine, PinOperation, PinStore},
    error::DispatchError,
    session::SessionManager,
};

/// Routes PIN requests between the session table (v1) and stateless crypto
/// contexts (v2), then through the crypto engine.
pub struct Dispatcher<E: CryptoEngine> {
    engine: E,
    sessions: SessionManager<E::Ephemeral>,
}

impl<E: CryptoEngine> Dispatcher<E> {
    /// Create a dispatcher with the given engine and session lifetime.
    pub fn new(engine: E, session_lifetime: Duration) -> Self {
        Self { engine, sessions: SessionManager::new(session_lifetime) }
    }

    /// Begin a handshake: generate a signed ephemeral key pair and park it
    /// in the session table, keyed by the hex-encoded public key.
    ///
    /// # Errors
    ///
    /// [`DispatchError::CryptoEngineFailure`] if key generation or signing
    /// fails.
    pub fn start_handshake(&self, now: Instant) -> Result<HandshakeReply, DispatchError> {
        tracing::debug!(sessions = self.sessions.len(), "starting handshake");

        let (ephemeral, pubkey, sig) = self.engine.begin_handshake()?;
        let reply = HandshakeReply::new(&pubkey, &sig);

        // The insert sweeps expired sessions first, so table growth is
        // bounded by request arrival.
        self.sessions.begin(reply.ske.clone(), ephemeral, now);
        Ok(reply)
    }

    /// Complete a PIN call against `store` with the endpoint-selected
    /// operation.
    ///
    /// # Errors
    ///
    /// The full taxonomy of [`DispatchError`]: malformed body, structural
    /// violation, unknown/expired/reused session, integrity failure, or an
    /// engine/store failure.
    pub fn complete_call(
        &self,
        op: PinOperation,
        body: &[u8],
        store: &dyn PinStore,
        now: Instant,
    ) -> Result<PinReply, DispatchError> {
        let request = PinRequest::parse(body)?;

        let (ephemeral, request) = match request {
            PinRequest::V1(req) => {
                let ephemeral = self.sessions.consume(&req.ske, now)?;
                tracing::debug!(ske = %req.ske, "consumed handshake session");
                (ephemeral, CallFields {
                    cke: req.cke,
                    encrypted_data: req.encrypted_data,
                    hmac: req.hmac_encrypted_data,
                })
            },
            PinRequest::V2(req) => {
                let ephemeral = self.engine.stateless_context(&req.replay_counter, &req.cke)?;
                (ephemeral, CallFields {
                    cke: req.cke,
                    encrypted_data: req.encrypted_data,
                    hmac: req.hmac_encrypted_data,
                })
            },
        };

        let (encrypted_key, hmac) = self.engine.call_with_payload(
            ephemeral,
            &request.cke,
            &request.encrypted_data,
            &request.hmac,
            op,
            store,
        )?;

        if encrypted_key.len() != ENCRYPTED_KEY_LEN {
            tracing::error!(
                expected = ENCRYPTED_KEY_LEN,
                actual = encrypted_key.len(),
                "engine returned mis-sized encrypted key"
            );
            return Err(DispatchError::IntegrityError);
        }

        Ok(PinReply::new(&encrypted_key, &hmac))
    }

    /// The underlying crypto engine.
    pub fn engine_ref(&self) -> &E {
        &self.engine
    }

    /// Number of sessions currently in the table (including not-yet-swept
    /// expired entries).
    pub fn live_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Remove expired sessions. Normally unnecessary — inserts and
    /// consumptions sweep opportunistically — but available to callers that
    /// want table hygiene during idle periods.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        self.sessions.sweep_expired(now)
    }
}

/// Fields common to both variants once the session question is settled.
struct CallFields {
    cke: Vec<u8>,
    encrypted_data: Vec<u8>,
    hmac: Vec<u8>,
}

impl<E: CryptoEngine> std::fmt::Debug for Dispatcher<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").field("sessions", &self.sessions).finish()
    }
}
