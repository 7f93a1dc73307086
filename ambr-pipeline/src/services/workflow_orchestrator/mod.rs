//! Pipeline orchestrator
//!
//! # State Progression
//! PENDING → EXTRACTING → ANALYZING → SEGMENTING → GENERATING → READY_FOR_REVIEW
//!
//! Publication is a separate admin action (see `admin`). FAILED is entered
//! only for book-level fatal conditions: unreadable text, an empty or
//! non-contiguous page list, persistence errors, or cancellation.
//!
//! # Architecture
//! Each state is handled by a dedicated `phase_*` method:
//!
//! - **EXTRACTING**: pull pages from the text source (or reuse persisted ones)
//! - **ANALYZING**: one descriptor per spread, bounded by the analysis queue;
//!   per-spread failures are recorded and absorbed
//! - **SEGMENTING**: scene boundaries, persisted in one transaction
//! - **GENERATING**: cache first, generator on a miss, bounded by the
//!   generation queue; per-scene failures are recorded and absorbed
//!
//! Status changes are compare-and-set against the expected previous status,
//! so a book is never driven by two workers at once.

use anyhow::{bail, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use ambr_common::config::TomlConfig;
use ambr_common::db::books;
use ambr_common::events::{AmbrEvent, EventBus};
use ambr_common::models::{BookStatus, DEFAULT_DURATION_SECONDS};

use super::asset_storage::AssetStorage;
use super::descriptor_extractor::DescriptorExtractor;
use super::job_queue::{BookJob, JobQueues};
use super::soundscape_cache::SoundscapeCache;
use super::soundscape_generator::SoundscapeGenerator;
use super::text_source::TextSource;

mod admin;
mod phase_analyzing;
mod phase_extracting;
mod phase_generating;
mod phase_segmenting;

/// Upstream collaborators used by the pipeline
pub struct PipelineServices {
    pub text_source: Arc<dyn TextSource>,
    pub extractor: DescriptorExtractor,
    pub generator: SoundscapeGenerator,
    pub storage: Arc<dyn AssetStorage>,
}

/// Cost accounting and generation defaults
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    /// Charged per content-analysis call, retries included
    pub analysis_unit_cost: f64,
    /// Charged per generation attempt
    pub generation_unit_cost: f64,
    pub default_duration_seconds: u32,
}

impl PipelineSettings {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            analysis_unit_cost: config.analysis.unit_cost,
            generation_unit_cost: config.synthesis.unit_cost,
            default_duration_seconds: config.synthesis.default_duration_seconds,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            analysis_unit_cost: 0.0,
            generation_unit_cost: 0.0,
            default_duration_seconds: DEFAULT_DURATION_SECONDS,
        }
    }
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub book_id: Uuid,
    pub pages: u32,
    pub spreads: u32,
    /// Spreads whose descriptor fell back to the neutral or previous one
    pub failed_spreads: u32,
    pub scenes: u32,
    pub cache_hits: u32,
    pub generated: u32,
    /// Scenes kept from a previous run with their soundscape
    pub reused: u32,
    pub scenes_without_audio: u32,
    pub processing_cost: f64,
}

pub struct PipelineOrchestrator {
    db: SqlitePool,
    event_bus: EventBus,
    queues: JobQueues,
    text_source: Arc<dyn TextSource>,
    extractor: DescriptorExtractor,
    cache: SoundscapeCache,
    generator: SoundscapeGenerator,
    storage: Arc<dyn AssetStorage>,
    settings: PipelineSettings,
}

impl PipelineOrchestrator {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        queues: JobQueues,
        services: PipelineServices,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            cache: SoundscapeCache::new(db.clone()),
            db,
            event_bus,
            queues,
            text_source: services.text_source,
            extractor: services.extractor,
            generator: services.generator,
            storage: services.storage,
            settings,
        }
    }

    pub fn queues(&self) -> &JobQueues {
        &self.queues
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Drive one book from PENDING to READY_FOR_REVIEW
    ///
    /// Returns `Ok(None)` when the book was not pending (already taken by
    /// another run, or reset meanwhile). On a book-level error the book is
    /// moved to FAILED before the error is returned.
    pub async fn process_book(&self, book_id: Uuid, cancel: &CancellationToken) -> Result<Option<RunSummary>> {
        if !books::transition_status(&self.db, book_id, BookStatus::Pending, BookStatus::Extracting, None).await? {
            tracing::info!(book_id = %book_id, "Book is not pending, skipping");
            return Ok(None);
        }
        self.emit_status(book_id, BookStatus::Pending, BookStatus::Extracting, None);

        let start_time = std::time::Instant::now();
        tracing::info!(book_id = %book_id, "Starting pipeline");

        match self.run_phases(book_id, cancel).await {
            Ok(summary) => {
                tracing::info!(
                    book_id = %book_id,
                    scenes = summary.scenes,
                    cache_hits = summary.cache_hits,
                    generated = summary.generated,
                    scenes_without_audio = summary.scenes_without_audio,
                    failed_spreads = summary.failed_spreads,
                    processing_cost = summary.processing_cost,
                    elapsed_ms = start_time.elapsed().as_millis() as u64,
                    "Pipeline completed"
                );
                Ok(Some(summary))
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(book_id = %book_id, error = %reason, "Pipeline failed");
                if let Err(mark_err) = self.mark_failed(book_id, &reason).await {
                    tracing::error!(book_id = %book_id, error = %mark_err, "Failed to mark book as failed");
                }
                Err(e)
            }
        }
    }

    async fn run_phases(&self, book_id: Uuid, cancel: &CancellationToken) -> Result<RunSummary> {
        let mut summary = RunSummary {
            book_id,
            ..Default::default()
        };

        let pages = self.phase_extracting(book_id).await?;
        summary.pages = pages.len() as u32;
        self.check_cancelled(cancel)?;

        let analysis = self.phase_analyzing(book_id, &pages, cancel).await?;
        summary.spreads = analysis.spreads.len() as u32;
        summary.failed_spreads = analysis.failed_spreads;
        summary.processing_cost += analysis.cost;
        self.check_cancelled(cancel)?;

        let scenes = self.phase_segmenting(book_id, &analysis).await?;
        summary.scenes = scenes.len() as u32;
        self.check_cancelled(cancel)?;

        let generation = self.phase_generating(book_id, &scenes, cancel).await?;
        summary.cache_hits = generation.cache_hits;
        summary.generated = generation.generated;
        summary.reused = generation.reused;
        summary.scenes_without_audio = generation.failed;
        summary.processing_cost += generation.cost;

        self.transition(book_id, BookStatus::Generating, BookStatus::ReadyForReview)
            .await?;

        self.event_bus.emit_lossy(AmbrEvent::PipelineCompleted {
            book_id,
            scenes: summary.scenes,
            scenes_without_audio: summary.scenes_without_audio,
            processing_cost: summary.processing_cost,
            timestamp: Utc::now(),
        });

        Ok(summary)
    }

    fn check_cancelled(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            bail!("Processing cancelled");
        }
        Ok(())
    }

    /// Compare-and-set status change plus event
    async fn transition(&self, book_id: Uuid, from: BookStatus, to: BookStatus) -> Result<()> {
        if !books::transition_status(&self.db, book_id, from, to, None).await? {
            bail!("Book {} left {} before it could move to {}", book_id, from, to);
        }
        tracing::info!(book_id = %book_id, from = %from, to = %to, "Book status changed");
        self.emit_status(book_id, from, to, None);
        Ok(())
    }

    /// Move a book from whatever non-terminal status it is in to FAILED
    async fn mark_failed(&self, book_id: Uuid, reason: &str) -> ambr_common::Result<()> {
        let book = books::load_book(&self.db, book_id).await?;
        if book.status.is_terminal() {
            return Ok(());
        }
        if books::transition_status(&self.db, book_id, book.status, BookStatus::Failed, Some(reason)).await? {
            self.emit_status(book_id, book.status, BookStatus::Failed, Some(reason.to_string()));
        }
        Ok(())
    }

    fn emit_status(&self, book_id: Uuid, old_status: BookStatus, new_status: BookStatus, error: Option<String>) {
        self.event_bus.emit_lossy(AmbrEvent::BookStatusChanged {
            book_id,
            old_status,
            new_status,
            error,
            timestamp: Utc::now(),
        });
    }

    fn emit_progress(&self, book_id: Uuid, status: BookStatus, completed: u32, total: u32) {
        self.event_bus.emit_lossy(AmbrEvent::PipelineProgress {
            book_id,
            status,
            completed,
            total,
            timestamp: Utc::now(),
        });
    }

    async fn charge(&self, book_id: Uuid, cost: f64) {
        if let Err(e) = books::add_processing_cost(&self.db, book_id, cost).await {
            tracing::warn!(book_id = %book_id, cost, error = %e, "Failed to record processing cost");
        }
    }

    /// Consume queued books until the channel closes or `cancel` fires
    ///
    /// Each book runs on its own task; stage concurrency is bounded by the
    /// shared [`JobQueues`], not by this loop.
    pub async fn run_worker(self: Arc<Self>, mut jobs: mpsc::Receiver<BookJob>, cancel: CancellationToken) {
        let mut tasks = JoinSet::new();
        tracing::info!("Pipeline worker started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                job = jobs.recv() => {
                    let Some(job) = job else { break };
                    let this = Arc::clone(&self);
                    let token = cancel.child_token();
                    tasks.spawn(async move {
                        if let Err(e) = this.process_book(job.book_id, &token).await {
                            tracing::warn!(book_id = %job.book_id, error = %e, "Book processing ended with error");
                        }
                    });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Pipeline task panicked");
                    }
                }
            }
        }

        tracing::info!(in_flight = tasks.len(), "Pipeline worker stopping");
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Pipeline task panicked");
            }
        }
    }
}
