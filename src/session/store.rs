//! Session store contract and the sqlite adapter
//!
//! `load` always yields a structurally valid session: an absent row, an
//! unreadable store or corrupted bytes all degrade to a fresh default.
//! Save failures are soft: the caller still delivers the reply.

use super::types::ConversationSession;
use super::SESSION_TTL_SECS;
use crate::db::Database;
use async_trait::async_trait;
use chrono::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to persist session: {0}")]
    Persist(String),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the session for a user. Never fails: corruption and absence
    /// both yield a default fresh session.
    async fn load(&self, user_id: &str) -> ConversationSession;

    /// Persist the full session, resetting its TTL to the inactivity
    /// window.
    async fn save(&self, user_id: &str, session: &ConversationSession) -> Result<(), StoreError>;
}

pub struct SqliteSessionStore {
    db: Database,
}

impl SqliteSessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, user_id: &str) -> ConversationSession {
        let raw = match self.db.load_session_raw(user_id) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::error!(user = %user_id, error = %err, "session store unreadable, using default session");
                return ConversationSession::default();
            }
        };
        match raw {
            Some(body) => match serde_json::from_str(&body) {
                Ok(session) => session,
                Err(err) => {
                    tracing::warn!(user = %user_id, error = %err, "corrupted session record, using default session");
                    ConversationSession::default()
                }
            },
            None => ConversationSession::default(),
        }
    }

    async fn save(&self, user_id: &str, session: &ConversationSession) -> Result<(), StoreError> {
        let body =
            serde_json::to_string(session).map_err(|e| StoreError::Persist(e.to_string()))?;
        self.db
            .save_session_raw(user_id, &body, Duration::seconds(SESSION_TTL_SECS))
            .map_err(|e| StoreError::Persist(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{DataBag, PatientRecord};
    use crate::stages::Stage;

    fn store() -> SqliteSessionStore {
        SqliteSessionStore::new(Database::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn absent_session_defaults() {
        let store = store();
        let session = store.load("5592999990000").await;
        assert_eq!(session.stage, Stage::Start);
        assert_eq!(session.bag, DataBag::default());
        assert!(session.history.is_empty());
    }

    #[tokio::test]
    async fn unparseable_bytes_default_without_raising() {
        let store = store();
        store
            .db
            .save_session_raw("z", "not json at all {{{", Duration::hours(8))
            .unwrap();
        let session = store.load("z").await;
        assert_eq!(session.stage, Stage::Start);
        assert!(session.history.is_empty());
    }

    #[tokio::test]
    async fn partially_missing_keys_are_defaulted() {
        let store = store();
        store
            .db
            .save_session_raw("p", r#"{"stage":"choose_date"}"#, Duration::hours(8))
            .unwrap();
        let session = store.load("p").await;
        assert_eq!(session.stage, Stage::ChooseDate);
        assert_eq!(session.bag, DataBag::default());
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let store = store();
        let mut session = ConversationSession::default();
        session.stage = Stage::ChooseProcedure;
        session.bag.patient = Some(PatientRecord {
            patient_id: Some(42),
            name: "João Lima".into(),
            insurance_id: Some(2),
        });
        session.push_user("quero agendar");
        store.save("u", &session).await.unwrap();

        let loaded = store.load("u").await;
        assert_eq!(loaded.stage, Stage::ChooseProcedure);
        assert_eq!(loaded.bag.patient, session.bag.patient);
        assert_eq!(loaded.history, session.history);
    }
}
