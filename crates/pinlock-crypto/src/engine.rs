//! The production [`CryptoEngine`] implementation.
//!
//! One [`PinEngine`] instance lives for the process lifetime, owning the
//! static identity. Ephemeral contexts are cheap per-request values; the
//! engine trait consumes them on use, so a context can never complete two
//! key agreements.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use pinlock_core::{
    AES_KEY_LEN_256, CryptoEngine, EngineError, Environment, PinOperation, PinStore,
    REPLAY_COUNTER_LEN,
};

use crate::{
    identity::{self, KeyLoadError},
    schedule::{self, SessionKeys},
};

/// Expected decrypted payload layout: `pin_id(32) ‖ pin_secret(32)` for
/// get, plus `entropy(32)` for set.
const PIN_FIELD_LEN: usize = 32;

/// Server-side key-agreement context for a single request.
///
/// v1 contexts carry a fresh secret and no salt; v2 contexts carry the
/// static exchange secret salted by the replay counter.
pub struct EphemeralContext {
    secret: StaticSecret,
    salt: Option<[u8; REPLAY_COUNTER_LEN]>,
}

impl std::fmt::Debug for EphemeralContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralContext")
            .field("secret", &"<redacted>")
            .field("salt", &self.salt.map(hex::encode))
            .finish()
    }
}

/// Production crypto engine: X25519 agreement, Ed25519 signing,
/// AES-256-GCM + HMAC payload sealing.
pub struct PinEngine<E: Environment> {
    env: E,
    signing: SigningKey,
    exchange: StaticSecret,
}

impl<E: Environment> PinEngine<E> {
    /// Build an engine around a loaded static signing key.
    ///
    /// # Errors
    ///
    /// [`KeyLoadError::Derivation`] if the exchange secret cannot be
    /// derived (never happens with a valid seed).
    pub fn new(env: E, signing: SigningKey) -> Result<Self, KeyLoadError> {
        let exchange = identity::derive_exchange_secret(&signing)?;
        Ok(Self { env, signing, exchange })
    }

    /// The server's static verifying key; clients use it to authenticate
    /// handshake replies.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// The static X25519 exchange public key used by the stateless (v2)
    /// variant. Provisioned to clients out-of-band.
    pub fn exchange_public(&self) -> [u8; 32] {
        PublicKey::from(&self.exchange).to_bytes()
    }

    fn agree(
        &self,
        ephemeral: EphemeralContext,
        cke: &[u8],
    ) -> Result<SessionKeys, EngineError> {
        let cke: [u8; 32] = cke
            .try_into()
            .map_err(|_| EngineError::Failure("client ephemeral key must be 32 bytes".to_string()))?;

        let shared = ephemeral.secret.diffie_hellman(&PublicKey::from(cke));
        if !shared.was_contributory() {
            return Err(EngineError::Failure("low-order client ephemeral key".to_string()));
        }

        SessionKeys::derive(shared.as_bytes(), ephemeral.salt.as_ref().map(|s| s.as_slice()))
    }
}

impl<E: Environment> CryptoEngine for PinEngine<E> {
    type Ephemeral = EphemeralContext;

    fn begin_handshake(&self) -> Result<(Self::Ephemeral, Vec<u8>, Vec<u8>), EngineError> {
        let secret = StaticSecret::from(self.env.random_array::<32>());
        let public = PublicKey::from(&secret);

        let sig = self.signing.sign(public.as_bytes());
        Ok((
            EphemeralContext { secret, salt: None },
            public.as_bytes().to_vec(),
            sig.to_bytes().to_vec(),
        ))
    }

    fn stateless_context(
        &self,
        replay_counter: &[u8; REPLAY_COUNTER_LEN],
        _cke: &[u8],
    ) -> Result<Self::Ephemeral, EngineError> {
        // The counter enters the key schedule as HKDF salt; the client
        // performs the mirror derivation against the static exchange key.
        // Counter freshness is enforced by the store's lockout policy, not
        // by the key agreement itself.
        Ok(EphemeralContext { secret: self.exchange.clone(), salt: Some(*replay_counter) })
    }

    fn call_with_payload(
        &self,
        ephemeral: Self::Ephemeral,
        cke: &[u8],
        encrypted_data: &[u8],
        hmac: &[u8],
        op: PinOperation,
        store: &dyn PinStore,
    ) -> Result<(Vec<u8>, Vec<u8>), EngineError> {
        let keys = self.agree(ephemeral, cke)?;

        schedule::verify_tag(&keys.request_hmac, encrypted_data, hmac)?;
        let plaintext = schedule::open(&keys.request_cipher, encrypted_data)?;

        let aes_key = run_pin_operation(op, &plaintext, store)?;
        let aes_key = Zeroizing::new(aes_key);

        let nonce = self.env.random_array::<{ schedule::NONCE_LEN }>();
        let encrypted_key = schedule::seal(&keys.response_cipher, &nonce, &aes_key[..])?;
        debug_assert_eq!(encrypted_key.len(), pinlock_core::ENCRYPTED_KEY_LEN);

        let tag = schedule::compute_tag(&keys.response_hmac, &encrypted_key)?;
        Ok((encrypted_key, tag.to_vec()))
    }
}

fn run_pin_operation(
    op: PinOperation,
    plaintext: &[u8],
    store: &dyn PinStore,
) -> Result<[u8; AES_KEY_LEN_256], EngineError> {
    let expected_len = match op {
        PinOperation::GetKey => 2 * PIN_FIELD_LEN,
        PinOperation::SetPin => 3 * PIN_FIELD_LEN,
    };
    if plaintext.len() != expected_len {
        return Err(EngineError::Failure(format!(
            "pin payload must be {expected_len} bytes, got {}",
            plaintext.len()
        )));
    }

    let (pin_id, rest) = plaintext.split_at(PIN_FIELD_LEN);
    let key = match op {
        PinOperation::GetKey => store.get_aes_key(pin_id, rest)?,
        PinOperation::SetPin => {
            let (pin_secret, entropy) = rest.split_at(PIN_FIELD_LEN);
            store.set_pin(pin_id, pin_secret, entropy)?
        },
    };
    Ok(key)
}
