//! Software loop mixer
//!
//! Sums every active voice into one interleaved stereo stream at the output
//! rate. Each voice loops its decoded buffer forever and is scaled by the
//! gain the scheduler last set. Buffers at another rate are converted with
//! [`resample`] when the voice starts; loads normally arrive already
//! converted.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use super::decode::DecodedAudio;
use super::output::AudioOutput;
use super::resampler::resample;

#[derive(Debug)]
struct Voice {
    audio: Arc<DecodedAudio>,
    gain: f32,
    /// Next frame to read
    position: usize,
}

impl Voice {
    /// Next stereo frame, wrapping at the end of the loop
    fn next_frame(&mut self) -> (f32, f32) {
        let frames = self.audio.frames();
        if frames == 0 {
            return (0.0, 0.0);
        }
        let index = self.position % frames;
        self.position = (index + 1) % frames;

        let samples = &self.audio.samples;
        (samples[index * 2] * self.gain, samples[index * 2 + 1] * self.gain)
    }
}

/// Mixer state rendered by the audio callback
#[derive(Debug)]
pub struct LoopMixer {
    sample_rate: u32,
    voices: HashMap<Uuid, Voice>,
}

impl LoopMixer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            voices: HashMap::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn gain(&self, scene_id: Uuid) -> Option<f32> {
        self.voices.get(&scene_id).map(|v| v.gain)
    }

    /// Fill `output` (interleaved stereo) with the mix of all voices
    ///
    /// The sum is clamped to [-1.0, 1.0]; with no voices the buffer is
    /// silence.
    pub fn render(&mut self, output: &mut [f32]) {
        output.fill(0.0);
        for voice in self.voices.values_mut() {
            for frame in output.chunks_exact_mut(2) {
                let (left, right) = voice.next_frame();
                frame[0] += left;
                frame[1] += right;
            }
        }
        for sample in output.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
}

impl AudioOutput for LoopMixer {
    fn play(&mut self, scene_id: Uuid, audio: Arc<DecodedAudio>, gain: f32) {
        let audio = if audio.sample_rate == self.sample_rate {
            audio
        } else {
            tracing::warn!(scene_id = %scene_id, rate = audio.sample_rate, "Voice not at output rate, resampling");
            match resample((*audio).clone(), self.sample_rate) {
                Ok(converted) => Arc::new(converted),
                Err(e) => {
                    tracing::error!(scene_id = %scene_id, error = %e, "Dropping voice");
                    return;
                }
            }
        };
        let voice = Voice {
            audio,
            gain: gain.clamp(0.0, 1.0),
            position: 0,
        };
        self.voices.insert(scene_id, voice);
    }

    fn output_rate(&self) -> Option<u32> {
        Some(self.sample_rate)
    }

    fn set_gain(&mut self, scene_id: Uuid, gain: f32) {
        if let Some(voice) = self.voices.get_mut(&scene_id) {
            voice.gain = gain.clamp(0.0, 1.0);
        }
    }

    fn stop(&mut self, scene_id: Uuid) {
        self.voices.remove(&scene_id);
    }

    fn stop_all(&mut self) {
        self.voices.clear();
    }
}
