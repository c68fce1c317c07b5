//! Distributed turn lock
//!
//! At most one turn per user identifier is ever in flight. Acquisition is
//! atomic create-if-absent with a short TTL safety net; failure to acquire
//! is not an error, it means "a turn is already in progress" and the
//! caller drops the message. Release runs on every exit path through the
//! RAII guard, including handler panics and early aborts. The session
//! store has no optimistic-concurrency check of its own, so this mutex is
//! the only thing serializing writes per user.

use crate::db::Database;
use chrono::Duration;
use std::sync::Arc;

/// Lock TTL. Long enough for a full turn of external calls, short enough
/// that a crashed turn cannot wedge a conversation for long.
pub const LOCK_TTL_SECS: i64 = 25;

pub trait TurnLock: Send + Sync {
    /// Atomic, non-blocking. True only if no unexpired lock exists.
    fn try_acquire(&self, user_id: &str) -> bool;

    /// Idempotent, unconditional delete.
    fn release(&self, user_id: &str);
}

pub struct SqliteTurnLock {
    db: Database,
}

impl SqliteTurnLock {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl TurnLock for SqliteTurnLock {
    fn try_acquire(&self, user_id: &str) -> bool {
        match self
            .db
            .try_acquire_lock(user_id, Duration::seconds(LOCK_TTL_SECS))
        {
            Ok(acquired) => acquired,
            Err(err) => {
                tracing::error!(user = %user_id, error = %err, "turn lock store unavailable");
                false
            }
        }
    }

    fn release(&self, user_id: &str) {
        if let Err(err) = self.db.release_lock(user_id) {
            tracing::error!(user = %user_id, error = %err, "failed to release turn lock");
        }
    }
}

/// Scoped acquisition: holds the lock for one turn and releases it on
/// drop, whatever the exit path.
pub struct TurnGuard {
    lock: Arc<dyn TurnLock>,
    user_id: String,
}

impl TurnGuard {
    /// `None` means a turn for this user is already in progress; the
    /// caller's contract is to drop the message silently.
    pub fn acquire(lock: Arc<dyn TurnLock>, user_id: &str) -> Option<Self> {
        if lock.try_acquire(user_id) {
            Some(Self {
                lock,
                user_id: user_id.to_string(),
            })
        } else {
            None
        }
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.lock.release(&self.user_id);
    }
}
