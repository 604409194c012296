//! Handshake session lifecycle.
//!
//! The session table is the only shared mutable state in the core: an
//! in-memory map from hex-encoded server ephemeral public key to the
//! key-agreement context created at handshake time. It is never persisted —
//! a restart invalidates all in-flight handshakes, which is acceptable
//! because a handshake is meant to be completed within seconds.
//!
//! ## Invariants
//!
//! - At-most-once: `consume` removes the session before returning it; a
//!   second attempt with the same id always fails.
//! - Bounded lifetime: expired sessions are swept before every insert and
//!   after every consumption — cooperative, amortized into request
//!   handling, with no background timer.
//! - One critical section per operation; callers never hold the lock across
//!   key generation or engine calls.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use thiserror::Error;

/// A single in-flight handshake awaiting its PIN call.
struct HandshakeSession<T> {
    /// Server-side ephemeral key-agreement context, exclusively owned.
    ephemeral: T,
    /// Creation time; sessions older than the configured lifetime are
    /// swept.
    created_at: Instant,
}

/// Error from session lookup.
///
/// Deliberately a single variant: absent, expired, and already-consumed
/// sessions are indistinguishable to the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Referenced session id is absent, expired, or already consumed.
    #[error("session not found")]
    NotFound,
}

/// Owns the table of in-flight handshake sessions.
///
/// Generic over the ephemeral context type so the core stays independent of
/// any concrete crypto backend.
pub struct SessionManager<T> {
    table: Mutex<HashMap<String, HandshakeSession<T>>>,
    lifetime: Duration,
}

impl<T> SessionManager<T> {
    /// Create an empty manager with the given session lifetime.
    pub fn new(lifetime: Duration) -> Self {
        Self { table: Mutex::new(HashMap::new()), lifetime }
    }

    /// Insert a new session keyed by `id`, sweeping expired sessions first
    /// so the table never grows unbounded between requests.
    ///
    /// A colliding id overwrites the older session. Ids are hex encodings
    /// of fresh ephemeral public keys, so a collision is cryptographically
    /// negligible; overwriting is the accepted outcome if it ever happens.
    pub fn begin(&self, id: String, ephemeral: T, now: Instant) {
        let mut table = self.table.lock();
        Self::sweep(&mut table, now, self.lifetime);
        table.insert(id, HandshakeSession { ephemeral, created_at: now });
    }

    /// Atomically remove and return the session's ephemeral context.
    ///
    /// This is the single mechanism providing at-most-once semantics: the
    /// entry is removed before the context is handed out, so a replayed
    /// request always fails here. An expired entry that has not been swept
    /// yet also fails — and stays removed, like any other consumption.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotFound`] if the id is absent, expired, or already
    /// consumed.
    pub fn consume(&self, id: &str, now: Instant) -> Result<T, SessionError> {
        let mut table = self.table.lock();
        let session = table.remove(id).ok_or(SessionError::NotFound)?;
        Self::sweep(&mut table, now, self.lifetime);

        if now.duration_since(session.created_at) >= self.lifetime {
            return Err(SessionError::NotFound);
        }
        Ok(session.ephemeral)
    }

    /// Remove every session whose age meets or exceeds the lifetime.
    ///
    /// Idempotent; also invoked internally by [`Self::begin`] and
    /// [`Self::consume`]. Returns the number of sessions removed.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let mut table = self.table.lock();
        Self::sweep(&mut table, now, self.lifetime)
    }

    /// Number of live (possibly not-yet-swept) sessions.
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// True if no sessions are in flight.
    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }

    fn sweep(
        table: &mut HashMap<String, HandshakeSession<T>>,
        now: Instant,
        lifetime: Duration,
    ) -> usize {
        let before = table.len();
        table.retain(|_, session| now.duration_since(session.created_at) < lifetime);
        before - table.len()
    }
}

impl<T> std::fmt::Debug for SessionManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.len())
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIFETIME: Duration = Duration::from_secs(300);

    fn manager() -> SessionManager<u32> {
        SessionManager::new(LIFETIME)
    }

    #[test]
    fn consume_returns_inserted_context() {
        let mgr = manager();
        let t0 = Instant::now();

        mgr.begin("ab12".to_string(), 7, t0);
        assert_eq!(mgr.consume("ab12", t0), Ok(7));
    }

    #[test]
    fn consume_is_at_most_once() {
        let mgr = manager();
        let t0 = Instant::now();

        mgr.begin("ab12".to_string(), 7, t0);
        assert!(mgr.consume("ab12", t0).is_ok());
        assert_eq!(mgr.consume("ab12", t0), Err(SessionError::NotFound));
    }

    #[test]
    fn unknown_id_fails() {
        let mgr = manager();
        assert_eq!(mgr.consume("missing", Instant::now()), Err(SessionError::NotFound));
    }

    #[test]
    fn expired_session_fails_and_stays_removed() {
        let mgr = manager();
        let t0 = Instant::now();

        mgr.begin("ab12".to_string(), 7, t0);

        let later = t0 + LIFETIME + Duration::from_secs(1);
        assert_eq!(mgr.consume("ab12", later), Err(SessionError::NotFound));
        assert!(mgr.is_empty());
    }

    #[test]
    fn session_at_exact_lifetime_is_expired() {
        let mgr = manager();
        let t0 = Instant::now();

        mgr.begin("ab12".to_string(), 7, t0);
        assert_eq!(mgr.consume("ab12", t0 + LIFETIME), Err(SessionError::NotFound));
    }

    #[test]
    fn session_just_before_lifetime_is_live() {
        let mgr = manager();
        let t0 = Instant::now();

        mgr.begin("ab12".to_string(), 7, t0);
        let almost = t0 + LIFETIME - Duration::from_secs(1);
        assert_eq!(mgr.consume("ab12", almost), Ok(7));
    }

    #[test]
    fn begin_sweeps_expired_sessions() {
        let mgr = manager();
        let t0 = Instant::now();

        mgr.begin("old".to_string(), 1, t0);

        let later = t0 + LIFETIME + Duration::from_secs(1);
        mgr.begin("new".to_string(), 2, later);

        assert_eq!(mgr.len(), 1);
        assert_eq!(mgr.consume("new", later), Ok(2));
    }

    #[test]
    fn consume_sweeps_other_expired_sessions() {
        let mgr = manager();
        let t0 = Instant::now();

        mgr.begin("old".to_string(), 1, t0);

        let later = t0 + LIFETIME + Duration::from_secs(1);
        mgr.begin("fresh".to_string(), 2, later);
        assert!(mgr.consume("fresh", later).is_ok());

        // "old" was swept as a side effect, not just left to rot.
        assert!(mgr.is_empty());
    }

    #[test]
    fn colliding_insert_overwrites() {
        let mgr = manager();
        let t0 = Instant::now();

        mgr.begin("ab12".to_string(), 1, t0);
        mgr.begin("ab12".to_string(), 2, t0);

        assert_eq!(mgr.len(), 1);
        assert_eq!(mgr.consume("ab12", t0), Ok(2));
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            // At-most-once holds for any insertion order, duplicates
            // included (a duplicate begin overwrites, it never doubles).
            #[test]
            fn every_id_consumed_at_most_once(ids in proptest::collection::vec("[a-f0-9]{4}", 1..20)) {
                let mgr = SessionManager::new(LIFETIME);
                let t0 = Instant::now();

                for id in &ids {
                    mgr.begin(id.clone(), 0u32, t0);
                }

                let mut seen = std::collections::HashSet::new();
                for id in &ids {
                    let result = mgr.consume(id, t0);
                    if seen.insert(id.clone()) {
                        prop_assert!(result.is_ok());
                    } else {
                        prop_assert!(result.is_err());
                    }
                }
                prop_assert!(mgr.is_empty());
            }
        }
    }

    #[test]
    fn sweep_expired_reports_removed_count() {
        let mgr = manager();
        let t0 = Instant::now();

        mgr.begin("a".to_string(), 1, t0);
        mgr.begin("b".to_string(), 2, t0);
        mgr.begin("c".to_string(), 3, t0 + Duration::from_secs(100));

        let later = t0 + LIFETIME + Duration::from_secs(1);
        assert_eq!(mgr.sweep_expired(later), 2);
        assert_eq!(mgr.len(), 1);
    }
}
