//! ambr-pipeline library interface
//!
//! Exposes the pipeline services and the HTTP router for integration testing

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod utils;

pub use crate::error::{AnalysisError, ApiError, ApiResult, GenerationError};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;

use ambr_common::events::EventBus;

use crate::services::{BookQueue, PipelineOrchestrator, StagedTextSource};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub orchestrator: Arc<PipelineOrchestrator>,
    /// Hands accepted books to the pipeline worker
    pub book_queue: BookQueue,
    /// Uploaded text waiting for the EXTRACTING phase
    pub staging: Arc<StagedTextSource>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        orchestrator: Arc<PipelineOrchestrator>,
        book_queue: BookQueue,
        staging: Arc<StagedTextSource>,
    ) -> Self {
        Self {
            db,
            event_bus: orchestrator.event_bus().clone(),
            orchestrator,
            book_queue,
            staging,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Remember an error for `/health`
    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::book_routes())
        .merge(api::scene_routes())
        .merge(api::progress_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .with_state(state)
}
