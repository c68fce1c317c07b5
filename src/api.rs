//! HTTP surface
//!
//! One webhook endpoint receives inbound messages from the messaging
//! provider; an SSE stream and a message-log endpoint serve the operator
//! console.

mod handlers;
mod sse;

pub use handlers::create_router;

use crate::db::Database;
use crate::orchestrator::Orchestrator;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub db: Database,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, db: Database) -> Self {
        Self { orchestrator, db }
    }
}
