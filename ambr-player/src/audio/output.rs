//! Gain sink the scheduler drives
//!
//! The scheduler never touches samples. It starts and stops looping voices,
//! one per scene, and sets each voice's gain; whatever renders audio
//! implements this trait.

use std::sync::{Arc, Mutex};

use uuid::Uuid;

use super::decode::DecodedAudio;

pub trait AudioOutput: Send {
    /// Start looping `audio` from its first frame
    ///
    /// Replaces any voice already playing for `scene_id`.
    fn play(&mut self, scene_id: Uuid, audio: Arc<DecodedAudio>, gain: f32);

    fn set_gain(&mut self, scene_id: Uuid, gain: f32);

    /// Release the voice immediately
    fn stop(&mut self, scene_id: Uuid);

    fn stop_all(&mut self);

    /// Rate buffers should be converted to before [`Self::play`]
    ///
    /// `None` plays buffers at whatever rate they arrive in.
    fn output_rate(&self) -> Option<u32> {
        None
    }
}

/// An output shared with a render callback
impl<T: AudioOutput> AudioOutput for Arc<Mutex<T>> {
    fn play(&mut self, scene_id: Uuid, audio: Arc<DecodedAudio>, gain: f32) {
        lock(self).play(scene_id, audio, gain);
    }

    fn set_gain(&mut self, scene_id: Uuid, gain: f32) {
        lock(self).set_gain(scene_id, gain);
    }

    fn stop(&mut self, scene_id: Uuid) {
        lock(self).stop(scene_id);
    }

    fn stop_all(&mut self) {
        lock(self).stop_all();
    }

    fn output_rate(&self) -> Option<u32> {
        lock(self).output_rate()
    }
}

fn lock<T>(shared: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
