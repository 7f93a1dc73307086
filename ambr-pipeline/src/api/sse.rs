//! Server-Sent Events for pipeline progress
//!
//! GET /events streams every [`AmbrEvent`]; `?book_id=` narrows the stream
//! to one book. Events are best-effort: a client that falls behind skips the
//! events it missed and should re-read `GET /books/{id}` for the truth.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ambr_common::events::AmbrEvent;

use crate::AppState;

const HEARTBEAT: Duration = Duration::from_secs(15);

#[derive(Debug, Default, Deserialize)]
pub struct EventFilter {
    pub book_id: Option<Uuid>,
}

impl EventFilter {
    fn accepts(&self, event: &AmbrEvent) -> bool {
        self.book_id.map_or(true, |id| event.book_id() == id)
    }
}

/// GET /events
pub async fn event_stream(
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(book_id = ?filter.book_id, "SSE client connected");

    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(HEARTBEAT) => {
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = rx.recv() => {
                    let event = match received {
                        Ok(event) => event,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "SSE client lagging, events dropped");
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };
                    if !filter.accepts(&event) {
                        continue;
                    }

                    let event_type = event.event_type();
                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            debug!(event_type, "SSE: sending event");
                            yield Ok(Event::default().event(event_type).data(json));
                        }
                        Err(e) => warn!(event_type, error = %e, "SSE: failed to serialize event"),
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT).text("heartbeat"))
}
