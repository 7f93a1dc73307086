//! Playback timeline assembly

use std::collections::HashMap;

use sqlx::SqlitePool;
use uuid::Uuid;

use ambr_common::db::{scenes, soundscapes};
use ambr_common::models::{Scene, Soundscape, TimelineAsset, TimelineEntry};
use ambr_common::Result;

/// Pair each scene with its soundscape, in scene order
pub fn build_timeline(scenes: &[Scene], soundscapes: &[Soundscape]) -> Vec<TimelineEntry> {
    let by_scene: HashMap<Uuid, &Soundscape> = soundscapes.iter().map(|s| (s.scene_id, s)).collect();

    let mut entries: Vec<TimelineEntry> = scenes
        .iter()
        .map(|scene| TimelineEntry {
            scene_id: scene.id,
            scene_number: scene.scene_number,
            start_page: scene.start_page,
            end_page: scene.end_page,
            page_spread_index: scene.page_spread_index,
            asset: by_scene.get(&scene.id).map(|s| TimelineAsset {
                soundscape_id: s.id,
                audio_url: s.audio_url.clone(),
                duration_seconds: s.duration_seconds,
                source_type: s.source_type,
            }),
        })
        .collect();
    entries.sort_by_key(|e| e.scene_number);
    entries
}

pub async fn load_timeline(pool: &SqlitePool, book_id: Uuid) -> Result<Vec<TimelineEntry>> {
    let scenes = scenes::load_scenes(pool, book_id).await?;
    let soundscapes = soundscapes::load_for_book(pool, book_id).await?;
    Ok(build_timeline(&scenes, &soundscapes))
}
