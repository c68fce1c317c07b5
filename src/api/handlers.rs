//! HTTP request handlers

use super::sse::updates_stream;
use super::AppState;
use crate::db::MessageDirection;
use crate::session::normalize_phone;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Inbound messages from the messaging provider; GET is the
        // provider's liveness probe
        .route("/webhook", post(receive_message).get(webhook_alive))
        // Operator console
        .route("/api/messages/:phone", get(message_log))
        .route("/api/updates", get(stream_updates))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn webhook_alive() -> &'static str {
    "atende webhook up"
}

#[derive(Debug, Deserialize)]
pub struct WebhookRequest {
    pub from: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

async fn receive_message(
    State(state): State<AppState>,
    Json(request): Json<WebhookRequest>,
) -> Result<Json<WebhookResponse>, (StatusCode, Json<Value>)> {
    if request.from.trim().is_empty() || request.body.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "from and body are required" })),
        ));
    }

    let phone = normalize_phone(&request.from);
    if let Err(err) =
        state
            .db
            .log_message(&phone, &request.body, MessageDirection::Received, "user")
    {
        tracing::warn!(error = %err, "failed to log inbound message");
    }

    match state.orchestrator.handle_turn(&request.from, &request.body).await {
        Some(reply) => {
            if let Err(err) =
                state
                    .db
                    .log_message(&phone, &reply, MessageDirection::Sent, "assistant")
            {
                tracing::warn!(error = %err, "failed to log outbound message");
            }
            Ok(Json(WebhookResponse {
                status: "ok",
                result: Some(reply),
            }))
        }
        // A turn was already in flight; the message was dropped.
        None => Ok(Json(WebhookResponse {
            status: "ignored",
            result: None,
        })),
    }
}

#[derive(Debug, Deserialize)]
struct LogQuery {
    limit: Option<u32>,
}

async fn message_log(
    State(state): State<AppState>,
    Path(phone): Path<String>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let phone = normalize_phone(&phone);
    match state.db.recent_messages(&phone, query.limit.unwrap_or(50)) {
        Ok(messages) => Ok(Json(json!({ "messages": messages }))),
        Err(err) => {
            tracing::error!(error = %err, "failed to read message log");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "message log unavailable" })),
            ))
        }
    }
}

async fn stream_updates(
    State(state): State<AppState>,
) -> axum::response::sse::Sse<impl futures::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>>
{
    updates_stream(state.orchestrator.subscribe())
}
