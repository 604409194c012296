//! In-memory PIN store with attempt lockout.
//!
//! One record per PIN identity: a SHA-256 hash of the PIN secret, the AES
//! key it protects, and a failed-attempt counter. Three consecutive bad
//! attempts wipe the record entirely — the protected key is gone, which is
//! the intended brute-force defense. A successful get resets the counter;
//! a set always resets the record with a fresh key.

use std::collections::HashMap;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use pinlock_core::{Environment, PinStore, PinStoreError};

/// Failed attempts allowed before the record is wiped.
pub const MAX_ATTEMPTS: u8 = 3;

struct PinRecord {
    secret_hash: [u8; 32],
    aes_key: [u8; 32],
    attempts: u8,
}

/// Process-lifetime PIN store.
///
/// Server randomness is mixed into every stored key so a client cannot
/// choose its own key material outright.
pub struct MemoryPinStore<E: Environment> {
    records: Mutex<HashMap<Vec<u8>, PinRecord>>,
    env: E,
}

impl<E: Environment> MemoryPinStore<E> {
    /// Create an empty store.
    pub fn new(env: E) -> Self {
        Self { records: Mutex::new(HashMap::new()), env }
    }

    /// Number of stored PIN records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// True if no records exist.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

fn hash_secret(pin_secret: &[u8]) -> [u8; 32] {
    Sha256::digest(pin_secret).into()
}

impl<E: Environment> PinStore for MemoryPinStore<E> {
    fn get_aes_key(&self, pin_id: &[u8], pin_secret: &[u8]) -> Result<[u8; 32], PinStoreError> {
        let mut records = self.records.lock();
        let record = records.get_mut(pin_id).ok_or(PinStoreError::UnknownPin)?;

        if hash_secret(pin_secret) != record.secret_hash {
            record.attempts += 1;
            if record.attempts >= MAX_ATTEMPTS {
                records.remove(pin_id);
                tracing::warn!("pin record wiped after repeated failures");
            }
            return Err(PinStoreError::BadPin);
        }

        record.attempts = 0;
        Ok(record.aes_key)
    }

    fn set_pin(
        &self,
        pin_id: &[u8],
        pin_secret: &[u8],
        entropy: &[u8],
    ) -> Result<[u8; 32], PinStoreError> {
        let server_entropy: [u8; 32] = self.env.random_array();

        let mut hasher = Sha256::new();
        hasher.update(server_entropy);
        hasher.update(entropy);
        let aes_key: [u8; 32] = hasher.finalize().into();

        let record = PinRecord { secret_hash: hash_secret(pin_secret), aes_key, attempts: 0 };
        self.records.lock().insert(pin_id.to_vec(), record);
        Ok(aes_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system_env::SystemEnv;

    const PIN_ID: &[u8] = &[0x11; 32];
    const SECRET: &[u8] = &[0x22; 32];
    const ENTROPY: &[u8] = &[0x33; 32];

    fn store() -> MemoryPinStore<SystemEnv> {
        MemoryPinStore::new(SystemEnv::new())
    }

    #[test]
    fn set_then_get_returns_same_key() {
        let store = store();
        let key = store.set_pin(PIN_ID, SECRET, ENTROPY).unwrap();
        assert_eq!(store.get_aes_key(PIN_ID, SECRET).unwrap(), key);
    }

    #[test]
    fn unknown_pin_fails() {
        let store = store();
        assert!(matches!(store.get_aes_key(PIN_ID, SECRET), Err(PinStoreError::UnknownPin)));
    }

    #[test]
    fn wrong_secret_fails() {
        let store = store();
        store.set_pin(PIN_ID, SECRET, ENTROPY).unwrap();
        assert!(matches!(
            store.get_aes_key(PIN_ID, &[0xEE; 32]),
            Err(PinStoreError::BadPin)
        ));
    }

    #[test]
    fn record_wiped_after_max_attempts() {
        let store = store();
        store.set_pin(PIN_ID, SECRET, ENTROPY).unwrap();

        for _ in 0..MAX_ATTEMPTS {
            assert!(store.get_aes_key(PIN_ID, &[0xEE; 32]).is_err());
        }

        // Even the right secret can no longer recover the key.
        assert!(matches!(store.get_aes_key(PIN_ID, SECRET), Err(PinStoreError::UnknownPin)));
        assert!(store.is_empty());
    }

    #[test]
    fn successful_get_resets_attempt_counter() {
        let store = store();
        store.set_pin(PIN_ID, SECRET, ENTROPY).unwrap();

        for _ in 0..(MAX_ATTEMPTS - 1) {
            assert!(store.get_aes_key(PIN_ID, &[0xEE; 32]).is_err());
        }
        assert!(store.get_aes_key(PIN_ID, SECRET).is_ok());

        // Counter reset: the same number of failures is tolerated again.
        for _ in 0..(MAX_ATTEMPTS - 1) {
            assert!(store.get_aes_key(PIN_ID, &[0xEE; 32]).is_err());
        }
        assert!(store.get_aes_key(PIN_ID, SECRET).is_ok());
    }

    #[test]
    fn set_replaces_existing_record() {
        let store = store();
        let first = store.set_pin(PIN_ID, SECRET, ENTROPY).unwrap();
        let second = store.set_pin(PIN_ID, &[0x44; 32], ENTROPY).unwrap();

        assert_ne!(first, second);
        assert!(store.get_aes_key(PIN_ID, SECRET).is_err());
        assert_eq!(store.get_aes_key(PIN_ID, &[0x44; 32]).unwrap(), second);
    }

    #[test]
    fn server_entropy_makes_keys_unique() {
        let store = store();
        let a = store.set_pin(&[1u8; 32], SECRET, ENTROPY).unwrap();
        let b = store.set_pin(&[2u8; 32], SECRET, ENTROPY).unwrap();
        assert_ne!(a, b);
    }
}
