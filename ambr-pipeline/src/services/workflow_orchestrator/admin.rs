//! Admin actions: publish, reprocess, curated overrides and deletion

use uuid::Uuid;

use ambr_common::db::{books, failures, scenes, soundscapes};
use ambr_common::models::{Book, BookStatus, Soundscape, SourceType};
use ambr_common::{Error, Result};

use super::PipelineOrchestrator;
use crate::services::asset_storage::{asset_key, detect_extension};
use crate::services::soundscape_cache::AssetReference;

impl PipelineOrchestrator {
    /// Make a reviewed book visible to readers
    ///
    /// Requires READY_FOR_REVIEW and a soundscape on every scene.
    pub async fn publish(&self, book_id: Uuid) -> Result<Book> {
        let book = books::load_book(&self.db, book_id).await?;
        if book.status != BookStatus::ReadyForReview {
            return Err(Error::Validation(format!(
                "Book {} is {}, only ready_for_review books can be published",
                book_id, book.status
            )));
        }

        let book_scenes = scenes::load_scenes(&self.db, book_id).await?;
        let assigned = soundscapes::load_for_book(&self.db, book_id).await?;
        let missing: Vec<String> = book_scenes
            .iter()
            .filter(|scene| !assigned.iter().any(|s| s.scene_id == scene.id))
            .map(|scene| scene.scene_number.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(Error::Validation(format!(
                "Scenes without a soundscape: {}",
                missing.join(", ")
            )));
        }

        if !books::transition_status(&self.db, book_id, BookStatus::ReadyForReview, BookStatus::Published, None).await? {
            return Err(Error::Validation(format!("Book {} changed status during publish", book_id)));
        }
        self.emit_status(book_id, BookStatus::ReadyForReview, BookStatus::Published, None);
        tracing::info!(book_id = %book_id, scenes = book_scenes.len(), "Book published");

        books::load_book(&self.db, book_id).await
    }

    /// Send a finished or failed book back to PENDING
    ///
    /// Returns `false` when the book is pending or still being processed.
    /// Pages, unchanged scenes and their soundscapes survive, so the next
    /// run only redoes what changed.
    pub async fn reset_for_reprocess(&self, book_id: Uuid) -> Result<bool> {
        let book = books::load_book(&self.db, book_id).await?;
        if !book.status.can_transition_to(BookStatus::Pending) {
            return Ok(false);
        }
        if !books::transition_status(&self.db, book_id, book.status, BookStatus::Pending, None).await? {
            return Ok(false);
        }

        failures::clear_failures(&self.db, book_id).await?;
        self.emit_status(book_id, book.status, BookStatus::Pending, None);
        tracing::info!(book_id = %book_id, from = %book.status, "Book reset for reprocessing");
        Ok(true)
    }

    /// Fail a pending book that could not be handed to the worker
    pub async fn fail_pending(&self, book_id: Uuid, reason: &str) -> Result<()> {
        if books::transition_status(&self.db, book_id, BookStatus::Pending, BookStatus::Failed, Some(reason)).await? {
            self.emit_status(book_id, BookStatus::Pending, BookStatus::Failed, Some(reason.to_string()));
        }
        Ok(())
    }

    /// Startup recovery after an unclean stop
    ///
    /// Books caught mid-pipeline are failed so an admin can reprocess them.
    /// Returns the books still pending, which the caller should enqueue.
    pub async fn recover_interrupted(&self) -> Result<Vec<Uuid>> {
        let mut pending = Vec::new();
        for book in books::list_books(&self.db).await? {
            if book.status == BookStatus::Pending {
                pending.push(book.id);
            } else if book.status.is_processing() {
                let reason = "Interrupted by service restart";
                if books::transition_status(&self.db, book.id, book.status, BookStatus::Failed, Some(reason)).await? {
                    tracing::warn!(book_id = %book.id, status = %book.status, "Interrupted book marked failed");
                    self.emit_status(book.id, book.status, BookStatus::Failed, Some(reason.to_string()));
                }
            }
        }
        Ok(pending)
    }

    /// Replace a scene's soundscape with an admin-supplied asset
    pub async fn override_soundscape(&self, scene_id: Uuid, bytes: &[u8], duration_seconds: u32) -> Result<Soundscape> {
        if bytes.is_empty() {
            return Err(Error::Validation("Asset is empty".into()));
        }
        let scene = scenes::load_scene(&self.db, scene_id).await?;

        let key = asset_key(SourceType::Curated, scene_id, detect_extension(bytes));
        let audio_url = match self.storage.put(&key, bytes).await {
            Ok(url) => url,
            Err(first) => {
                tracing::warn!(key = %key, error = %first, "Asset upload failed, retrying once");
                self.storage.put(&key, bytes).await?
            }
        };

        let asset = AssetReference {
            audio_url,
            asset_key: key.clone(),
            duration_seconds,
            source_type: SourceType::Curated,
            confidence: None,
            generation_job_id: None,
            prompt: None,
            source_capability: Some("curated".to_string()),
        };

        let (soundscape, replaced) = match self.cache.store(&scene, &asset).await {
            Ok(stored) => stored,
            Err(e) => {
                self.release_asset(&key).await;
                return Err(e);
            }
        };
        if let Some(old) = replaced {
            if old.asset_key != key {
                self.release_asset(&old.asset_key).await;
            }
        }

        tracing::info!(scene_id = %scene_id, key = %key, "Curated soundscape assigned");
        self.emit_assigned(scene.book_id, &scene, &soundscape, false);
        Ok(soundscape)
    }

    /// Remove a scene's soundscape and flag the scene for curation
    pub async fn remove_soundscape(&self, scene_id: Uuid) -> Result<Option<Soundscape>> {
        scenes::load_scene(&self.db, scene_id).await?;
        let removed = soundscapes::delete_for_scene(&self.db, scene_id).await?;
        scenes::set_needs_curation(&self.db, scene_id, true).await?;

        if let Some(old) = &removed {
            self.release_asset(&old.asset_key).await;
            tracing::info!(scene_id = %scene_id, key = %old.asset_key, "Soundscape removed");
        }
        Ok(removed)
    }

    /// Delete a book with its pages, scenes and soundscapes
    ///
    /// Refused while the pipeline owns the book.
    pub async fn delete_book(&self, book_id: Uuid) -> Result<bool> {
        let Some(book) = books::get_book(&self.db, book_id).await? else {
            return Ok(false);
        };
        if book.status.is_processing() {
            return Err(Error::Validation(format!("Book {} is {}", book_id, book.status)));
        }

        let assets = soundscapes::load_for_book(&self.db, book_id).await?;
        let deleted = books::delete_book(&self.db, book_id).await?;
        for soundscape in assets {
            self.release_asset(&soundscape.asset_key).await;
        }

        tracing::info!(book_id = %book_id, "Book deleted");
        Ok(deleted)
    }

    /// Delete a stored asset once no soundscape references it
    pub(super) async fn release_asset(&self, key: &str) {
        match soundscapes::count_asset_references(&self.db, key).await {
            Ok(0) => {
                if let Err(e) = self.storage.delete(key).await {
                    tracing::warn!(key, error = %e, "Failed to delete unreferenced asset");
                }
            }
            Ok(references) => {
                tracing::debug!(key, references, "Asset still referenced, keeping");
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to count asset references");
            }
        }
    }
}
