//! GENERATING
//!
//! Scenes are started in ascending scene_number, each holding a generation
//! queue permit while it runs. Per scene:
//! 1. a soundscape kept from a previous run is left alone
//! 2. otherwise the cache is consulted
//! 3. on a miss the generator runs and the result is stored
//!
//! A failed scene is recorded, flagged for curation and skipped.

use anyhow::{bail, Result};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use uuid::Uuid;

use ambr_common::db::{failures, scenes, soundscapes, FailureRecord, FailureStage};
use ambr_common::events::AmbrEvent;
use ambr_common::models::{BookStatus, Scene, Soundscape};

use super::PipelineOrchestrator;
use crate::services::job_queue::QueueName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SceneOutcome {
    Reused,
    CacheHit,
    Generated,
    Failed,
}

#[derive(Debug, Default)]
pub(super) struct GenerationTally {
    pub cache_hits: u32,
    pub generated: u32,
    pub reused: u32,
    pub failed: u32,
    pub cost: f64,
}

impl PipelineOrchestrator {
    pub(super) async fn phase_generating(
        &self,
        book_id: Uuid,
        book_scenes: &[Scene],
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<GenerationTally> {
        let total = book_scenes.len() as u32;
        tracing::info!(
            book_id = %book_id,
            scenes = total,
            concurrency = self.queues.limit(QueueName::Generation),
            "Phase: GENERATING"
        );
        self.emit_progress(book_id, BookStatus::Generating, 0, total);

        let mut ordered: Vec<&Scene> = book_scenes.iter().collect();
        ordered.sort_by_key(|s| s.scene_number);
        let mut pending = ordered.into_iter();
        let mut next_scene = pending.next();

        let mut in_flight = FuturesUnordered::new();
        let mut tally = GenerationTally::default();
        let mut attempts_total = 0;
        let mut completed = 0;

        while next_scene.is_some() || !in_flight.is_empty() {
            tokio::select! {
                _ = cancel.cancelled() => bail!("Processing cancelled"),
                permit = self.queues.acquire(QueueName::Generation), if next_scene.is_some() => {
                    let permit = permit?;
                    if let Some(scene) = next_scene.take() {
                        in_flight.push(async move {
                            let _permit = permit;
                            self.process_scene(book_id, scene).await
                        });
                    }
                    next_scene = pending.next();
                }
                Some((outcome, attempts)) = in_flight.next(), if !in_flight.is_empty() => {
                    attempts_total += attempts;
                    match outcome {
                        SceneOutcome::Reused => tally.reused += 1,
                        SceneOutcome::CacheHit => tally.cache_hits += 1,
                        SceneOutcome::Generated => tally.generated += 1,
                        SceneOutcome::Failed => tally.failed += 1,
                    }
                    completed += 1;
                    self.emit_progress(book_id, BookStatus::Generating, completed, total);
                }
            }
        }

        tally.cost = attempts_total as f64 * self.settings.generation_unit_cost;
        self.charge(book_id, tally.cost).await;

        tracing::info!(
            book_id = %book_id,
            reused = tally.reused,
            cache_hits = tally.cache_hits,
            generated = tally.generated,
            failed = tally.failed,
            "Soundscape generation completed"
        );

        Ok(tally)
    }

    /// Returns the outcome and the number of generation attempts charged
    async fn process_scene(&self, book_id: Uuid, scene: &Scene) -> (SceneOutcome, u32) {
        match soundscapes::get_for_scene(&self.db, scene.id).await {
            Ok(Some(_)) => {
                tracing::debug!(book_id = %book_id, scene_number = scene.scene_number, "Keeping existing soundscape");
                return (SceneOutcome::Reused, 0);
            }
            Ok(None) => {}
            Err(e) => {
                self.scene_failed(book_id, scene, &format!("Failed to read soundscape: {}", e), 0)
                    .await;
                return (SceneOutcome::Failed, 0);
            }
        }

        match self.cache.reuse(scene).await {
            Ok(Some(soundscape)) => {
                self.emit_assigned(book_id, scene, &soundscape, true);
                return (SceneOutcome::CacheHit, 0);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    book_id = %book_id,
                    scene_number = scene.scene_number,
                    error = %e,
                    "Cache lookup failed, generating instead"
                );
            }
        }

        let outcome = self
            .generator
            .generate(scene.id, &scene.audio_prompt, self.settings.default_duration_seconds)
            .await;
        let attempts = outcome.attempts;

        let asset = match outcome.result {
            Ok(asset) => asset,
            Err(e) => {
                self.scene_failed(book_id, scene, &e.to_string(), attempts).await;
                return (SceneOutcome::Failed, attempts);
            }
        };

        match self.cache.store(scene, &asset).await {
            Ok((soundscape, replaced)) => {
                if let Some(old) = replaced {
                    self.release_asset(&old.asset_key).await;
                }
                self.emit_assigned(book_id, scene, &soundscape, false);
                (SceneOutcome::Generated, attempts)
            }
            Err(e) => {
                self.scene_failed(book_id, scene, &format!("Failed to store soundscape: {}", e), attempts)
                    .await;
                self.release_asset(&asset.asset_key).await;
                (SceneOutcome::Failed, attempts)
            }
        }
    }

    /// Record a permanent scene failure; the scene stays without audio
    async fn scene_failed(&self, book_id: Uuid, scene: &Scene, reason: &str, attempts: u32) {
        tracing::warn!(
            book_id = %book_id,
            scene_id = %scene.id,
            scene_number = scene.scene_number,
            attempts,
            reason,
            "Scene generation failed, flagged for curation"
        );

        let record = FailureRecord {
            book_id,
            scene_id: Some(scene.id),
            spread_index: Some(scene.page_spread_index),
            stage: FailureStage::Generation,
            reason: reason.to_string(),
            attempts,
            created_at: Utc::now(),
        };
        if let Err(e) = failures::record_failure(&self.db, &record).await {
            tracing::error!(book_id = %book_id, scene_id = %scene.id, error = %e, "Failed to record scene failure");
        }
        if let Err(e) = scenes::set_needs_curation(&self.db, scene.id, true).await {
            tracing::error!(book_id = %book_id, scene_id = %scene.id, error = %e, "Failed to flag scene for curation");
        }

        self.event_bus.emit_lossy(AmbrEvent::SceneGenerationFailed {
            book_id,
            scene_id: scene.id,
            scene_number: scene.scene_number,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub(super) fn emit_assigned(&self, book_id: Uuid, scene: &Scene, soundscape: &Soundscape, cache_hit: bool) {
        self.event_bus.emit_lossy(AmbrEvent::SceneSoundscapeAssigned {
            book_id,
            scene_id: scene.id,
            scene_number: scene.scene_number,
            soundscape_id: soundscape.id,
            audio_url: soundscape.audio_url.clone(),
            cache_hit,
            timestamp: Utc::now(),
        });
    }
}
