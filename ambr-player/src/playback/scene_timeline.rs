//! Scene lookup by page
//!
//! Scenes are kept sorted by first page. The index of the last resolved scene
//! is cached, so sequential page turns resolve with a bounds check on the
//! cached entry or its successor instead of a search.

use std::ops::RangeInclusive;

use uuid::Uuid;

use ambr_common::models::{spread_index_for_page, TimelineEntry};

#[derive(Debug, Clone, Default)]
pub struct SceneTimeline {
    /// Sorted by `start_page` ascending
    entries: Vec<TimelineEntry>,

    /// Index of the scene that contained the last resolved page
    current_index: Option<usize>,
}

impl SceneTimeline {
    pub fn new(mut entries: Vec<TimelineEntry>) -> Self {
        entries.sort_by_key(|e| e.start_page);
        Self {
            entries,
            current_index: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn entry(&self, scene_id: Uuid) -> Option<&TimelineEntry> {
        self.entries.iter().find(|e| e.scene_id == scene_id)
    }

    /// Scene containing `page`, `None` past the last scene or in a gap
    pub fn scene_for_page(&mut self, page: u32) -> Option<&TimelineEntry> {
        let index = self.locate(page)?;
        self.current_index = Some(index);
        self.entries.get(index)
    }

    fn locate(&self, page: u32) -> Option<usize> {
        if let Some(current) = self.current_index {
            for index in [current, current + 1] {
                if self.entries.get(index).is_some_and(|e| e.contains_page(page)) {
                    return Some(index);
                }
            }
        }

        // First scene not ending before the page
        let index = self.entries.partition_point(|e| e.end_page < page);
        self.entries
            .get(index)
            .filter(|e| e.contains_page(page))
            .map(|_| index)
    }

    /// Scenes touching any spread in `spreads`, in page order
    pub fn scenes_for_spreads(&self, spreads: RangeInclusive<u32>) -> Vec<&TimelineEntry> {
        self.entries
            .iter()
            .filter(|e| {
                let first = spread_index_for_page(e.start_page);
                first <= *spreads.end() && e.last_spread() >= *spreads.start()
            })
            .collect()
    }
}
