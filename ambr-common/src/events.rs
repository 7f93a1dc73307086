//! Progress events and the EventBus
//!
//! The orchestrator publishes status changes here; SSE handlers and tests
//! subscribe. Delivery is best-effort: the persisted book status is always
//! authoritative, so a dropped event never corrupts state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::BookStatus;

/// Pipeline progress events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AmbrEvent {
    /// Book moved between pipeline states
    BookStatusChanged {
        book_id: Uuid,
        old_status: BookStatus,
        new_status: BookStatus,
        /// Present when `new_status` is failed
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A spread's descriptor could not be extracted; processing continued
    SpreadAnalysisFailed {
        book_id: Uuid,
        spread_index: u32,
        reason: String,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// A scene received a soundscape (cache hit, generation or override)
    SceneSoundscapeAssigned {
        book_id: Uuid,
        scene_id: Uuid,
        scene_number: u32,
        soundscape_id: Uuid,
        audio_url: String,
        /// True when the asset was reused from the cache
        cache_hit: bool,
        timestamp: DateTime<Utc>,
    },

    /// Generation failed permanently; the scene needs manual curation
    SceneGenerationFailed {
        book_id: Uuid,
        scene_id: Uuid,
        scene_number: u32,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Intra-phase progress
    PipelineProgress {
        book_id: Uuid,
        status: BookStatus,
        completed: u32,
        total: u32,
        timestamp: DateTime<Utc>,
    },

    /// All scenes attempted
    PipelineCompleted {
        book_id: Uuid,
        scenes: u32,
        scenes_without_audio: u32,
        processing_cost: f64,
        timestamp: DateTime<Utc>,
    },
}

impl AmbrEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            AmbrEvent::BookStatusChanged { .. } => "BookStatusChanged",
            AmbrEvent::SpreadAnalysisFailed { .. } => "SpreadAnalysisFailed",
            AmbrEvent::SceneSoundscapeAssigned { .. } => "SceneSoundscapeAssigned",
            AmbrEvent::SceneGenerationFailed { .. } => "SceneGenerationFailed",
            AmbrEvent::PipelineProgress { .. } => "PipelineProgress",
            AmbrEvent::PipelineCompleted { .. } => "PipelineCompleted",
        }
    }

    /// Book the event concerns
    pub fn book_id(&self) -> Uuid {
        match self {
            AmbrEvent::BookStatusChanged { book_id, .. }
            | AmbrEvent::SpreadAnalysisFailed { book_id, .. }
            | AmbrEvent::SceneSoundscapeAssigned { book_id, .. }
            | AmbrEvent::SceneGenerationFailed { book_id, .. }
            | AmbrEvent::PipelineProgress { book_id, .. }
            | AmbrEvent::PipelineCompleted { book_id, .. } => *book_id,
        }
    }
}

/// Broadcast channel for [`AmbrEvent`]s
///
/// Events emitted before a receiver subscribes are not delivered to it.
/// Slow receivers lag and lose the oldest events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AmbrEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AmbrEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns the number of receivers, or an error when nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: AmbrEvent) -> Result<usize, broadcast::error::SendError<AmbrEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: AmbrEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_event(book_id: Uuid) -> AmbrEvent {
        AmbrEvent::BookStatusChanged {
            book_id,
            old_status: BookStatus::Pending,
            new_status: BookStatus::Extracting,
            error: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let book_id = Uuid::new_v4();

        assert_eq!(bus.emit(status_event(book_id)).unwrap(), 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.book_id(), book_id);
        assert_eq!(received.event_type(), "BookStatusChanged");
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        assert!(bus.emit(status_event(Uuid::new_v4())).is_err());
        // Must not panic
        bus.emit_lossy(status_event(Uuid::new_v4()));
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.capacity(), 4);
    }

    #[test]
    fn test_serialized_with_type_tag() {
        let json = serde_json::to_value(status_event(Uuid::nil())).unwrap();
        assert_eq!(json["type"], "BookStatusChanged");
        assert_eq!(json["new_status"], "extracting");
    }
}
