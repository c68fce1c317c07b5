//! Turn orchestration
//!
//! One entry point per inbound message: acquire the per-user turn lock
//! (or drop the message), load the session, run expiry and greeting
//! resets, give the intent classifier first refusal, dispatch to the
//! current stage, persist, broadcast. Persistence failures are soft; the
//! user still gets the reply that was computed for them.

use crate::intent;
use crate::lock::{TurnGuard, TurnLock};
use crate::llm::LlmGateway;
use crate::gateway::SchedulingGateway;
use crate::session::{normalize_phone, SessionStore};
use crate::stages::{self, redirect, Stage, StageContext};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Exact greetings that restart a conversation from anywhere. Partial
/// matches deliberately do not count: "oi, continua" inside a longer
/// sentence is not a restart.
const GREETINGS: &[&str] = &[
    "oi",
    "ola",
    "bom dia",
    "boa tarde",
    "boa noite",
    "inicio",
    "menu",
    "comecar",
];

/// One finished turn, broadcast to SSE subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct TurnUpdate {
    pub user_id: String,
    pub stage: Stage,
    pub reply: String,
    pub at: DateTime<Utc>,
}

pub struct Orchestrator {
    sessions: Arc<dyn SessionStore>,
    lock: Arc<dyn TurnLock>,
    scheduling: Arc<dyn SchedulingGateway>,
    llm: Arc<dyn LlmGateway>,
    updates: broadcast::Sender<TurnUpdate>,
}

impl Orchestrator {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        lock: Arc<dyn TurnLock>,
        scheduling: Arc<dyn SchedulingGateway>,
        llm: Arc<dyn LlmGateway>,
        updates: broadcast::Sender<TurnUpdate>,
    ) -> Self {
        Self {
            sessions,
            lock,
            scheduling,
            llm,
            updates,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TurnUpdate> {
        self.updates.subscribe()
    }

    /// Process one inbound message. `None` means a turn for this user is
    /// already in flight and the message was dropped, not queued.
    pub async fn handle_turn(&self, raw_user_id: &str, text: &str) -> Option<String> {
        let user_id = normalize_phone(raw_user_id);
        let Some(_guard) = TurnGuard::acquire(self.lock.clone(), &user_id) else {
            tracing::info!(user = %user_id, "turn already in flight, dropping message");
            return None;
        };

        let mut session = self.sessions.load(&user_id).await;
        let now = Utc::now();

        if session.is_expired(now) {
            tracing::info!(user = %user_id, "session expired, starting over");
            session.reset_preserving_patient();
        }

        // A greeting restarts from anywhere, terminal stages included.
        // Neutral input at a terminal stage falls through to the closed
        // handler and must leave the session untouched.
        let normalized = intent::normalize(text);
        if session.stage != Stage::Start && GREETINGS.contains(&normalized.as_str()) {
            session.reset_preserving_patient();
        }

        let history = session.history.clone();
        let ctx = StageContext {
            user_id: &user_id,
            history: &history,
            scheduling: self.scheduling.as_ref(),
            llm: self.llm.as_ref(),
        };
        let stage = session.stage;
        let bag = std::mem::take(&mut session.bag);

        let outcome = match intent::classify(&normalized) {
            Some(intent) if stage.allows_override(intent) => {
                tracing::info!(user = %user_id, ?intent, from = ?stage, "intent override");
                redirect::apply(intent, stage, bag)
            }
            _ => stages::dispatch(stage, &ctx, text, bag).await,
        };

        session.push_user(text);
        session.push_assistant(&outcome.reply);
        session.stage = outcome.next;
        session.bag = outcome.bag;
        session.last_activity = now;

        if let Err(err) = self.sessions.save(&user_id, &session).await {
            tracing::error!(user = %user_id, error = %err, "failed to persist session, replying anyway");
        }

        let _ = self.updates.send(TurnUpdate {
            user_id: user_id.clone(),
            stage: session.stage,
            reply: outcome.reply.clone(),
            at: now,
        });

        tracing::debug!(user = %user_id, from = ?stage, to = ?session.stage, "turn finished");
        Some(outcome.reply)
    }
}
