//! Test doubles for the collaborator seams
//!
//! All mocks are queue-driven: tests enqueue exactly the responses a
//! scenario needs and any call past the end of a queue fails loudly, so
//! an unexpected extra collaborator call shows up as a test failure
//! instead of silent behavior.

use crate::gateway::{GatewayError, Operation, SchedulingGateway};
use crate::llm::{ChatTurn, FunctionSpec, LlmError, LlmGateway, LlmReply};
use crate::lock::TurnLock;
use crate::session::{ConversationSession, SessionStore, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct MockLlm {
    queue: Mutex<VecDeque<Result<LlmReply, LlmError>>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_reply(&self, reply: LlmReply) {
        self.queue.lock().unwrap().push_back(Ok(reply));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.queue.lock().unwrap().push_back(Err(error));
    }
}

#[async_trait]
impl LlmGateway for MockLlm {
    async fn complete(
        &self,
        _turns: &[ChatTurn],
        _tools: &[FunctionSpec],
    ) -> Result<LlmReply, LlmError> {
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::unknown("no queued LLM response")))
    }
}

#[derive(Default)]
pub struct MockSchedulingGateway {
    queues: Mutex<HashMap<Operation, VecDeque<Result<Value, GatewayError>>>>,
    requests: Mutex<Vec<(Operation, Value)>>,
}

impl MockSchedulingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_ok(&self, op: Operation, value: Value) {
        self.queues
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(Ok(value));
    }

    pub fn queue_err(&self, op: Operation, error: GatewayError) {
        self.queues
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(Err(error));
    }

    /// Every invocation seen so far, in order, with its parameter object.
    pub fn requests(&self) -> Vec<(Operation, Value)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SchedulingGateway for MockSchedulingGateway {
    async fn invoke(&self, op: Operation, params: Value) -> Result<Value, GatewayError> {
        self.requests.lock().unwrap().push((op, params));
        self.queues
            .lock()
            .unwrap()
            .get_mut(&op)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(GatewayError::Transport(format!(
                    "no queued response for {op:?}"
                )))
            })
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, ConversationSession>>,
    fail_saves: AtomicBool,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent save fail, to exercise soft-failure paths.
    pub fn fail_saves(&self) {
        self.fail_saves.store(true, Ordering::SeqCst);
    }

    pub fn put(&self, user_id: &str, session: ConversationSession) {
        self.sessions
            .lock()
            .unwrap()
            .insert(user_id.to_string(), session);
    }

    pub fn get(&self, user_id: &str) -> Option<ConversationSession> {
        self.sessions.lock().unwrap().get(user_id).cloned()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, user_id: &str) -> ConversationSession {
        self.get(user_id).unwrap_or_default()
    }

    async fn save(&self, user_id: &str, session: &ConversationSession) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Persist("simulated store outage".into()));
        }
        self.put(user_id, session.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryTurnLock {
    held: Mutex<HashSet<String>>,
}

impl MemoryTurnLock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TurnLock for MemoryTurnLock {
    fn try_acquire(&self, user_id: &str) -> bool {
        self.held.lock().unwrap().insert(user_id.to_string())
    }

    fn release(&self, user_id: &str) {
        self.held.lock().unwrap().remove(user_id);
    }
}
