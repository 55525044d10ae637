use std::convert::Infallible;

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use futures::stream::{self, Stream};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::services::event_bus::AttemptEvent;
use crate::AppState;

/// Live attempt feed for the placement dashboard.
/// GET /api/placement/stream
pub async fn placement_stream(State(state): State<AppState>) -> impl IntoResponse {
    let rx = state.events.subscribe();
    tracing::info!(
        subscribers = state.events.subscriber_count(),
        "Placement dashboard connected"
    );
    Sse::new(attempt_event_stream(rx)).keep_alive(KeepAlive::default())
}

/// Ends when the bus closes; the receiver is dropped with the connection.
pub fn attempt_event_stream(
    rx: broadcast::Receiver<AttemptEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => match Event::default().event(event.event_name()).json_data(&event) {
                    Ok(sse) => return Some((Ok(sse), rx)),
                    Err(e) => {
                        tracing::warn!(error = %e, "Dropping unserializable attempt event");
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Placement subscriber lagged, skipping events");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}
