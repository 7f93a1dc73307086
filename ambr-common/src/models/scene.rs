//! Scene records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SceneDescriptors;
use crate::{Error, Result};

/// Contiguous page range sharing one narrative descriptor and one audio identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: Uuid,
    pub book_id: Uuid,
    /// 1-based, strictly increasing within a book
    pub scene_number: u32,
    pub start_page: u32,
    pub end_page: u32,
    /// Index of the 2-page spread the scene begins at (0-based)
    pub page_spread_index: u32,
    pub descriptors: SceneDescriptors,
    /// Prompt handed to the audio-synthesis capability
    pub audio_prompt: String,
    /// Set when generation permanently failed and an admin must curate audio
    pub needs_curation: bool,
    pub created_at: DateTime<Utc>,
}

impl Scene {
    pub fn new(
        book_id: Uuid,
        scene_number: u32,
        start_page: u32,
        end_page: u32,
        page_spread_index: u32,
        descriptors: SceneDescriptors,
        audio_prompt: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            book_id,
            scene_number,
            start_page,
            end_page,
            page_spread_index,
            descriptors,
            audio_prompt,
            needs_curation: false,
            created_at: Utc::now(),
        }
    }

    pub fn contains_page(&self, page_number: u32) -> bool {
        (self.start_page..=self.end_page).contains(&page_number)
    }

    pub fn page_count(&self) -> u32 {
        self.end_page - self.start_page + 1
    }

    /// Same boundaries and tags, ignoring identity and timestamps
    pub fn same_shape(&self, other: &Scene) -> bool {
        self.scene_number == other.scene_number
            && self.start_page == other.start_page
            && self.end_page == other.end_page
            && self.page_spread_index == other.page_spread_index
            && self.descriptors == other.descriptors
            && self.audio_prompt == other.audio_prompt
    }
}

/// Validate a book's scenes before they are written
///
/// Checks:
/// - every scene belongs to the same book
/// - `start_page <= end_page` and pages are 1-based
/// - `scene_number` strictly increasing in slice order
/// - no two page ranges intersect
pub fn validate_scene_ranges(scenes: &[Scene]) -> Result<()> {
    let Some(first) = scenes.first() else {
        return Ok(());
    };

    let mut previous: Option<&Scene> = None;
    for scene in scenes {
        if scene.book_id != first.book_id {
            return Err(Error::Validation(format!(
                "Scene {} belongs to book {}, expected {}",
                scene.scene_number, scene.book_id, first.book_id
            )));
        }
        if scene.start_page == 0 {
            return Err(Error::Validation(format!(
                "Scene {} starts at page 0; pages are 1-based",
                scene.scene_number
            )));
        }
        if scene.start_page > scene.end_page {
            return Err(Error::Validation(format!(
                "Scene {} has start_page {} > end_page {}",
                scene.scene_number, scene.start_page, scene.end_page
            )));
        }
        if let Some(prev) = previous {
            if scene.scene_number <= prev.scene_number {
                return Err(Error::Validation(format!(
                    "Scene numbers must strictly increase ({} after {})",
                    scene.scene_number, prev.scene_number
                )));
            }
        }
        previous = Some(scene);
    }

    let mut by_start: Vec<&Scene> = scenes.iter().collect();
    by_start.sort_by_key(|s| s.start_page);
    for pair in by_start.windows(2) {
        if pair[1].start_page <= pair[0].end_page {
            return Err(Error::Validation(format!(
                "Scene {} (pages {}-{}) overlaps scene {} (pages {}-{})",
                pair[1].scene_number,
                pair[1].start_page,
                pair[1].end_page,
                pair[0].scene_number,
                pair[0].start_page,
                pair[0].end_page
            )));
        }
    }

    Ok(())
}
