//! Client-side counterpart of the engine.
//!
//! Performs the mirror half of the protocol: verify the signed handshake
//! reply, agree on session keys, seal the PIN payload, and open the
//! returned encrypted key. Used by the round-trip tests and by operator
//! tooling; device firmware implements the same flow.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

use pinlock_core::{EngineError, Environment, PinOperation, REPLAY_COUNTER_LEN};

use crate::schedule::{self, SessionKeys};

/// Client-side protocol failures.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Handshake reply fields are not valid hex.
    #[error("handshake reply is not valid hex")]
    InvalidHex,

    /// Server key or signature has the wrong length.
    #[error("handshake reply field has wrong length")]
    InvalidLength,

    /// Signature over the server ephemeral key does not verify.
    #[error("handshake signature verification failed")]
    BadSignature,

    /// Response integrity check failed.
    #[error("response integrity check failed")]
    Integrity,

    /// Key agreement or sealing failed.
    #[error("client crypto failure: {0}")]
    Crypto(String),
}

impl From<EngineError> for ClientError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Integrity => Self::Integrity,
            EngineError::Failure(reason) => Self::Crypto(reason),
        }
    }
}

/// One client-side key agreement, v1 or v2.
pub struct ClientSession {
    public: PublicKey,
    keys: SessionKeys,
}

impl core::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ClientSession").field("public", &self.public).finish_non_exhaustive()
    }
}

impl ClientSession {
    /// Complete a v1 handshake: verify `sig` over the server ephemeral key
    /// under the server's static verifying key, then agree on session keys.
    ///
    /// # Errors
    ///
    /// [`ClientError::BadSignature`] if the reply is not authentic; hex and
    /// length errors if it is malformed.
    pub fn start<E: Environment>(
        env: &E,
        server_identity: &VerifyingKey,
        ske_hex: &str,
        sig_hex: &str,
    ) -> Result<Self, ClientError> {
        let ske = decode32(ske_hex)?;
        let sig_bytes = hex::decode(sig_hex).map_err(|_| ClientError::InvalidHex)?;
        let sig = Signature::from_slice(&sig_bytes).map_err(|_| ClientError::InvalidLength)?;

        server_identity.verify(&ske, &sig).map_err(|_| ClientError::BadSignature)?;

        Self::agree(env, &ske, None)
    }

    /// Build a v2 session against the server's static exchange key, salted
    /// by the replay counter.
    pub fn stateless<E: Environment>(
        env: &E,
        server_exchange: &[u8; 32],
        replay_counter: [u8; REPLAY_COUNTER_LEN],
    ) -> Result<Self, ClientError> {
        Self::agree(env, server_exchange, Some(replay_counter))
    }

    fn agree<E: Environment>(
        env: &E,
        server_public: &[u8; 32],
        salt: Option<[u8; REPLAY_COUNTER_LEN]>,
    ) -> Result<Self, ClientError> {
        let secret = StaticSecret::from(env.random_array::<32>());
        let public = PublicKey::from(&secret);

        let shared = secret.diffie_hellman(&PublicKey::from(*server_public));
        if !shared.was_contributory() {
            return Err(ClientError::Crypto("low-order server key".to_string()));
        }

        let keys = SessionKeys::derive(shared.as_bytes(), salt.as_ref().map(|s| s.as_slice()))?;
        Ok(Self { public, keys })
    }

    /// The client ephemeral public key to send as `cke`.
    pub fn cke(&self) -> Vec<u8> {
        self.public.as_bytes().to_vec()
    }

    /// Seal a PIN payload for the given operation.
    ///
    /// Returns `(encrypted_data, hmac_encrypted_data)`.
    pub fn seal_request<E: Environment>(
        &self,
        env: &E,
        op: PinOperation,
        pin_id: &[u8; 32],
        pin_secret: &[u8; 32],
        entropy: &[u8; 32],
    ) -> Result<(Vec<u8>, Vec<u8>), ClientError> {
        let mut payload = Vec::with_capacity(96);
        payload.extend_from_slice(pin_id);
        payload.extend_from_slice(pin_secret);
        if op == PinOperation::SetPin {
            payload.extend_from_slice(entropy);
        }

        let nonce = env.random_array::<{ schedule::NONCE_LEN }>();
        let encrypted_data = schedule::seal(&self.keys.request_cipher, &nonce, &payload)?;
        let tag = schedule::compute_tag(&self.keys.request_hmac, &encrypted_data)?;
        Ok((encrypted_data, tag.to_vec()))
    }

    /// Verify and open the server's encrypted key reply.
    ///
    /// # Errors
    ///
    /// [`ClientError::Integrity`] on tag mismatch or AEAD failure.
    pub fn open_response(
        &self,
        encrypted_key: &[u8],
        hmac: &[u8],
    ) -> Result<[u8; 32], ClientError> {
        schedule::verify_tag(&self.keys.response_hmac, encrypted_key, hmac)?;
        let plaintext = schedule::open(&self.keys.response_cipher, encrypted_key)?;

        let key: [u8; 32] =
            plaintext.as_slice().try_into().map_err(|_| ClientError::Integrity)?;
        Ok(key)
    }
}

fn decode32(hex_str: &str) -> Result<[u8; 32], ClientError> {
    let bytes = hex::decode(hex_str).map_err(|_| ClientError::InvalidHex)?;
    bytes.try_into().map_err(|_| ClientError::InvalidLength)
}
