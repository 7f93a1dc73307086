//! Playback timeline shared between the pipeline API and the player

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SourceType;

/// Spread (0-based) that a 1-based page belongs to
///
/// Pages 1-2 are spread 0, pages 3-4 spread 1, and so on. Page 0 is treated
/// as page 1.
pub fn spread_index_for_page(page_number: u32) -> u32 {
    page_number.saturating_sub(1) / 2
}

/// Audio bound to a timeline entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineAsset {
    pub soundscape_id: Uuid,
    pub audio_url: String,
    pub duration_seconds: u32,
    pub source_type: SourceType,
}

/// One scene as seen by the player
///
/// `asset` is `None` when the scene has no soundscape; such scenes are read
/// without audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub scene_id: Uuid,
    pub scene_number: u32,
    pub start_page: u32,
    pub end_page: u32,
    pub page_spread_index: u32,
    pub asset: Option<TimelineAsset>,
}

impl TimelineEntry {
    pub fn contains_page(&self, page_number: u32) -> bool {
        (self.start_page..=self.end_page).contains(&page_number)
    }

    /// Last spread touched by this scene
    pub fn last_spread(&self) -> u32 {
        spread_index_for_page(self.end_page)
    }

    /// Whether the scene covers any page of `spread`
    pub fn covers_spread(&self, spread: u32) -> bool {
        let first = spread_index_for_page(self.start_page);
        (first..=self.last_spread()).contains(&spread)
    }
}
