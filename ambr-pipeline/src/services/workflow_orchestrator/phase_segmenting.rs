//! SEGMENTING
//!
//! Scenes replace the book's previous scenes in one transaction. Scenes that
//! come out identical to the previous run keep their identity and soundscape;
//! assets of the soundscapes dropped with the others are released.

use anyhow::Result;
use uuid::Uuid;

use ambr_common::db::scenes;
use ambr_common::models::{BookStatus, Scene};

use super::phase_analyzing::AnalysisOutcome;
use super::PipelineOrchestrator;
use crate::services::scene_segmenter::segment;

impl PipelineOrchestrator {
    pub(super) async fn phase_segmenting(&self, book_id: Uuid, analysis: &AnalysisOutcome) -> Result<Vec<Scene>> {
        tracing::info!(book_id = %book_id, spreads = analysis.spreads.len(), "Phase: SEGMENTING");

        let computed = segment(book_id, &analysis.spreads, &analysis.descriptors)?;
        let replacement = scenes::replace_book_scenes(&self.db, book_id, computed).await?;
        for key in &replacement.dropped_asset_keys {
            self.release_asset(key).await;
        }
        let stored = replacement.scenes;

        for scene in &stored {
            tracing::debug!(
                book_id = %book_id,
                scene_number = scene.scene_number,
                start_page = scene.start_page,
                end_page = scene.end_page,
                "Scene"
            );
        }
        tracing::info!(book_id = %book_id, scenes = stored.len(), "Segmentation completed");

        self.transition(book_id, BookStatus::Segmenting, BookStatus::Generating)
            .await?;

        Ok(stored)
    }
}
