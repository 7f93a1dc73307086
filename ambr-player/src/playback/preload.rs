//! Decoded buffers held ahead of the reader

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

use uuid::Uuid;

use crate::audio::DecodedAudio;

/// Spreads beyond the current one whose scenes are fetched early
pub const PRELOAD_AHEAD_SPREADS: u32 = 3;

#[derive(Debug, Clone)]
struct Preloaded {
    audio: Arc<DecodedAudio>,
    last_spread: u32,
}

#[derive(Debug, Default)]
pub struct PreloadWindow {
    buffers: HashMap<Uuid, Preloaded>,
}

impl PreloadWindow {
    /// Spreads that should have audio ready when the reader is on `current`
    pub fn window(current: u32) -> RangeInclusive<u32> {
        current..=current.saturating_add(PRELOAD_AHEAD_SPREADS)
    }

    pub fn insert(&mut self, scene_id: Uuid, audio: Arc<DecodedAudio>, last_spread: u32) {
        self.buffers.insert(scene_id, Preloaded { audio, last_spread });
    }

    pub fn get(&self, scene_id: Uuid) -> Option<Arc<DecodedAudio>> {
        self.buffers.get(&scene_id).map(|p| Arc::clone(&p.audio))
    }

    pub fn contains(&self, scene_id: Uuid) -> bool {
        self.buffers.contains_key(&scene_id)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Drop buffers whose last spread is more than one spread behind
    /// `current`, except scenes in `keep`
    ///
    /// Returns the evicted scenes.
    pub fn evict_behind(&mut self, current: u32, keep: &[Uuid]) -> Vec<Uuid> {
        let stale: Vec<Uuid> = self
            .buffers
            .iter()
            .filter(|(id, p)| p.last_spread + 1 < current && !keep.contains(id))
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            self.buffers.remove(id);
        }
        stale
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}
