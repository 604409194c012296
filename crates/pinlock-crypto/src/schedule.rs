//! Key schedule and payload sealing shared by the server engine and the
//! client counterpart.
//!
//! Both sides derive the same [`SessionKeys`] from the ECDH shared secret
//! (salted by the replay counter in the stateless variant), then seal and
//! open payloads symmetrically: 16-byte nonce ‖ AES-256-GCM ciphertext,
//! with an outer HMAC-SHA256 tag over the whole blob under the direction's
//! tag key.

use aes_gcm::{
    AesGcm, Nonce,
    aead::{Aead, KeyInit, consts::U16},
    aes::Aes256,
};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use pinlock_core::EngineError;

/// AES-256-GCM with a 16-byte nonce, sized so a sealed 32-byte key is
/// exactly 64 bytes on the wire.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

type HmacSha256 = Hmac<Sha256>;

/// Nonce length prepended to every sealed payload.
pub(crate) const NONCE_LEN: usize = 16;

/// Per-direction session keys derived from one ECDH agreement.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct SessionKeys {
    /// Seals/opens the client→server PIN payload.
    pub request_cipher: [u8; 32],
    /// Tags the client→server payload.
    pub request_hmac: [u8; 32],
    /// Seals/opens the server→client encrypted key.
    pub response_cipher: [u8; 32],
    /// Tags the server→client encrypted key.
    pub response_hmac: [u8; 32],
}

impl SessionKeys {
    /// Derive the schedule from a shared secret; `salt` is the replay
    /// counter in the stateless variant, absent for session-bound calls.
    pub fn derive(shared_secret: &[u8], salt: Option<&[u8]>) -> Result<Self, EngineError> {
        let hk = Hkdf::<Sha256>::new(salt, shared_secret);
        Ok(Self {
            request_cipher: expand32(&hk, b"pinlock request cipher v1")?,
            request_hmac: expand32(&hk, b"pinlock request hmac v1")?,
            response_cipher: expand32(&hk, b"pinlock response cipher v1")?,
            response_hmac: expand32(&hk, b"pinlock response hmac v1")?,
        })
    }
}

fn expand32(hk: &Hkdf<Sha256>, info: &[u8]) -> Result<[u8; 32], EngineError> {
    let mut okm = [0u8; 32];
    hk.expand(info, &mut okm)
        .map_err(|_| EngineError::Failure("hkdf expansion failed".to_string()))?;
    Ok(okm)
}

/// Seal `plaintext` under `key` with the given nonce: nonce ‖ ciphertext.
pub(crate) fn seal(
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>, EngineError> {
    let cipher = Aes256Gcm16::new(key.into());
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| EngineError::Failure("payload encryption failed".to_string()))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Open a sealed blob. AEAD failure is an integrity error, as is a blob too
/// short to carry a nonce.
pub(crate) fn open(key: &[u8; 32], blob: &[u8]) -> Result<Zeroizing<Vec<u8>>, EngineError> {
    if blob.len() < NONCE_LEN {
        return Err(EngineError::Integrity);
    }
    let (nonce, ciphertext) = blob.split_at(NONCE_LEN);

    let cipher = Aes256Gcm16::new(key.into());
    let plaintext =
        cipher.decrypt(Nonce::from_slice(nonce), ciphertext).map_err(|_| EngineError::Integrity)?;
    Ok(Zeroizing::new(plaintext))
}

/// HMAC-SHA256 tag over a sealed blob.
pub(crate) fn compute_tag(key: &[u8; 32], blob: &[u8]) -> Result<[u8; 32], EngineError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|_| EngineError::Failure("hmac key rejected".to_string()))?;
    mac.update(blob);
    Ok(mac.finalize().into_bytes().into())
}

/// Constant-time verification of a blob's tag.
pub(crate) fn verify_tag(key: &[u8; 32], blob: &[u8], tag: &[u8]) -> Result<(), EngineError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|_| EngineError::Failure("hmac key rejected".to_string()))?;
    mac.update(blob);
    mac.verify_slice(tag).map_err(|_| EngineError::Integrity)
}
