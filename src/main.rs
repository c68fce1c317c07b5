//! Atende - conversational booking assistant
//!
//! A Rust backend implementing the turn-based conversation engine behind
//! a WhatsApp booking assistant for a physiotherapy clinic.

mod api;
mod db;
mod gateway;
mod intent;
mod invalidation;
mod llm;
mod lock;
mod orchestrator;
mod session;
mod stages;
#[cfg(test)]
mod testing;

use api::{create_router, AppState};
use db::Database;
use gateway::HttpSchedulingGateway;
use llm::{OpenAiChat, ResilientLlm};
use lock::SqliteTurnLock;
use orchestrator::Orchestrator;
use session::SqliteSessionStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atende=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let db_path = std::env::var("ATENDE_DB_PATH").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        format!("{home}/.atende/atende.db")
    });

    let port: u16 = std::env::var("ATENDE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %db_path, "Opening database");
    let db = Database::open(&db_path)?;

    let purged = db.purge_expired_sessions()?;
    if purged > 0 {
        tracing::info!(purged, "Purged expired sessions");
    }

    // Language model behind the layered-degradation wrapper
    let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
    if api_key.is_empty() {
        tracing::warn!("No OPENAI_API_KEY configured; every model call will use the canned fallback");
    }
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
    let llm = Arc::new(ResilientLlm::new(OpenAiChat::new(api_key, model)?));

    // Scheduling provider
    let scheduling_url = std::env::var("SCHEDULING_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:8080".to_string());
    let scheduling_key = std::env::var("SCHEDULING_API_KEY").unwrap_or_default();
    if scheduling_key.is_empty() {
        tracing::warn!("No SCHEDULING_API_KEY configured");
    }
    let scheduling = Arc::new(HttpSchedulingGateway::new(scheduling_url, scheduling_key)?);

    let sessions = Arc::new(SqliteSessionStore::new(db.clone()));
    let lock = Arc::new(SqliteTurnLock::new(db.clone()));
    let (updates, _) = tokio::sync::broadcast::channel(64);
    let orchestrator = Arc::new(Orchestrator::new(sessions, lock, scheduling, llm, updates));

    let state = AppState::new(orchestrator, db);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Atende listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
