//! Server-Sent Events for the operator console

use crate::orchestrator::TurnUpdate;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Convert the orchestrator's broadcast channel into an SSE stream.
pub fn updates_stream(
    rx: tokio::sync::broadcast::Receiver<TurnUpdate>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(update) => Some(Ok(turn_event(&update))),
        Err(_) => None, // Skip lagged messages
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn turn_event(update: &TurnUpdate) -> Event {
    Event::default()
        .event("turn")
        .data(serde_json::to_string(update).unwrap_or_default())
}
