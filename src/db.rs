//! Sqlite persistence for sessions, turn locks and the message log.
//!
//! A single connection behind a mutex keeps every statement atomic with
//! respect to the others, which is what the turn-lock relies on.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type DbResult<T> = Result<T, DbError>;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    user_id    TEXT PRIMARY KEY,
    body       TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS turn_locks (
    user_id    TEXT PRIMARY KEY,
    expires_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id         TEXT PRIMARY KEY,
    phone      TEXT NOT NULL,
    body       TEXT NOT NULL,
    direction  TEXT NOT NULL,
    sender     TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_phone ON messages(phone, created_at);
";

/// One row of the operator-facing message log.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoredMessage {
    pub id: String,
    pub phone: String,
    pub body: String,
    pub direction: MessageDirection,
    pub sender: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Received,
    Sent,
}

impl MessageDirection {
    fn as_str(self) -> &'static str {
        match self {
            MessageDirection::Received => "received",
            MessageDirection::Sent => "sent",
        }
    }
}

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Session Operations ====================

    /// Read the raw session body for a user, if any.
    ///
    /// Expired rows are still returned: staleness is handled by the
    /// orchestrator's inactivity-window reset, which must keep the
    /// patient identity. `purge_expired_sessions` garbage-collects.
    pub fn load_session_raw(&self, user_id: &str) -> DbResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT body FROM sessions WHERE user_id = ?1")?;
        let mut rows = stmt.query(params![user_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Write the full session body, resetting its TTL.
    pub fn save_session_raw(&self, user_id: &str, body: &str, ttl: Duration) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        let expires_at = (Utc::now() + ttl).to_rfc3339();
        conn.execute(
            "INSERT INTO sessions (user_id, body, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET body = ?2, expires_at = ?3",
            params![user_id, body, expires_at],
        )?;
        Ok(())
    }

    /// Delete sessions whose TTL has lapsed. Run at startup.
    pub fn purge_expired_sessions(&self) -> DbResult<usize> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let purged = conn.execute("DELETE FROM sessions WHERE expires_at < ?1", params![now])?;
        Ok(purged)
    }

    // ==================== Turn Lock Operations ====================

    /// Atomic create-if-absent. Returns true only when no unexpired lock
    /// exists for this key.
    pub fn try_acquire_lock(&self, user_id: &str, ttl: Duration) -> DbResult<bool> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        // Reap a stale lock first so a crashed turn cannot wedge the user.
        conn.execute(
            "DELETE FROM turn_locks WHERE user_id = ?1 AND expires_at < ?2",
            params![user_id, now.to_rfc3339()],
        )?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO turn_locks (user_id, expires_at) VALUES (?1, ?2)",
            params![user_id, (now + ttl).to_rfc3339()],
        )?;
        Ok(inserted == 1)
    }

    /// Unconditional, idempotent delete.
    pub fn release_lock(&self, user_id: &str) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM turn_locks WHERE user_id = ?1", params![user_id])?;
        Ok(())
    }

    // ==================== Message Log Operations ====================

    /// Append one message to the conversation log.
    pub fn log_message(
        &self,
        phone: &str,
        body: &str,
        direction: MessageDirection,
        sender: &str,
    ) -> DbResult<StoredMessage> {
        let conn = self.conn.lock().unwrap();
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO messages (id, phone, body, direction, sender, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, phone, body, direction.as_str(), sender, now.to_rfc3339()],
        )?;
        Ok(StoredMessage {
            id,
            phone: phone.to_string(),
            body: body.to_string(),
            direction,
            sender: sender.to_string(),
            created_at: now,
        })
    }

    /// Most recent messages for one phone number, oldest first.
    pub fn recent_messages(&self, phone: &str, limit: u32) -> DbResult<Vec<StoredMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, phone, body, direction, sender, created_at
             FROM messages WHERE phone = ?1
             ORDER BY created_at DESC LIMIT ?2",
        )?;
        let mut messages: Vec<StoredMessage> = stmt
            .query_map(params![phone, limit], |row| {
                let direction: String = row.get(3)?;
                let created_at: String = row.get(5)?;
                Ok(StoredMessage {
                    id: row.get(0)?,
                    phone: row.get(1)?,
                    body: row.get(2)?,
                    direction: if direction == "sent" {
                        MessageDirection::Sent
                    } else {
                        MessageDirection::Received
                    },
                    sender: row.get(4)?,
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            })?
            .collect::<Result<_, _>>()?;
        messages.reverse();
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_roundtrip_resets_ttl() {
        let db = Database::open_in_memory().unwrap();
        db.save_session_raw("u1", "{}", Duration::hours(8)).unwrap();
        assert_eq!(db.load_session_raw("u1").unwrap().unwrap(), "{}");
        db.save_session_raw("u1", r#"{"stage":"start"}"#, Duration::hours(8))
            .unwrap();
        assert_eq!(
            db.load_session_raw("u1").unwrap().unwrap(),
            r#"{"stage":"start"}"#
        );
    }

    #[test]
    fn sessions_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atende.db");
        {
            let db = Database::open(&path).unwrap();
            db.save_session_raw("u1", r#"{"stage":"choose_date"}"#, Duration::hours(8))
                .unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(
            db.load_session_raw("u1").unwrap().unwrap(),
            r#"{"stage":"choose_date"}"#
        );
    }

    #[test]
    fn purge_removes_only_expired_sessions() {
        let db = Database::open_in_memory().unwrap();
        db.save_session_raw("old", "{}", Duration::seconds(-10))
            .unwrap();
        db.save_session_raw("live", "{}", Duration::hours(8)).unwrap();
        assert_eq!(db.purge_expired_sessions().unwrap(), 1);
        assert!(db.load_session_raw("old").unwrap().is_none());
        assert!(db.load_session_raw("live").unwrap().is_some());
    }

    #[test]
    fn lock_is_exclusive_until_released() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.try_acquire_lock("u1", Duration::seconds(25)).unwrap());
        assert!(!db.try_acquire_lock("u1", Duration::seconds(25)).unwrap());
        // Independent key is unaffected.
        assert!(db.try_acquire_lock("u2", Duration::seconds(25)).unwrap());
        db.release_lock("u1").unwrap();
        assert!(db.try_acquire_lock("u1", Duration::seconds(25)).unwrap());
    }

    #[test]
    fn expired_lock_can_be_reacquired() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.try_acquire_lock("u1", Duration::seconds(-1)).unwrap());
        assert!(db.try_acquire_lock("u1", Duration::seconds(25)).unwrap());
    }

    #[test]
    fn release_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.release_lock("never-held").unwrap();
        db.release_lock("never-held").unwrap();
    }

    #[test]
    fn message_log_orders_oldest_first() {
        let db = Database::open_in_memory().unwrap();
        db.log_message("5592", "oi", MessageDirection::Received, "user")
            .unwrap();
        db.log_message("5592", "olá!", MessageDirection::Sent, "agent")
            .unwrap();
        let log = db.recent_messages("5592", 10).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].body, "oi");
        assert_eq!(log[1].direction, MessageDirection::Sent);
    }
}
