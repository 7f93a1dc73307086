//! Test helpers for the player
//!
//! A manually advanced clock, an output that records gains instead of
//! rendering, an in-memory asset loader, and WAV fixtures.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use ambr_common::models::{spread_index_for_page, SourceType, TimelineAsset, TimelineEntry};
use ambr_player::{AssetLoader, AudioOutput, Clock, DecodedAudio, PlaybackScheduler, PlayerError};

pub const EPSILON: f32 = 1e-3;

/// Clock that only moves when told to
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputCall {
    Play(Uuid, f32),
    Stop(Uuid),
    StopAll,
}

#[derive(Debug, Default)]
pub struct Recorded {
    /// Gains of voices currently on the output
    pub gains: HashMap<Uuid, f32>,
    /// Play/stop calls in order; gain updates are not logged
    pub calls: Vec<OutputCall>,
    /// Sample rate of the buffer each voice was started with
    pub rates: HashMap<Uuid, u32>,
}

/// Gain sink recording what the scheduler asked for
///
/// Clones share the same record, so tests keep one while the scheduler owns
/// the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingOutput {
    inner: Arc<Mutex<Recorded>>,
    rate: Option<u32>,
}

impl RecordingOutput {
    /// Output asking for buffers at `rate`
    pub fn at_rate(rate: u32) -> Self {
        Self {
            rate: Some(rate),
            ..Self::default()
        }
    }

    pub fn rate_of(&self, scene_id: Uuid) -> Option<u32> {
        self.inner.lock().unwrap().rates.get(&scene_id).copied()
    }

    pub fn gain(&self, scene_id: Uuid) -> Option<f32> {
        self.inner.lock().unwrap().gains.get(&scene_id).copied()
    }

    pub fn active(&self) -> usize {
        self.inner.lock().unwrap().gains.len()
    }

    pub fn plays_of(&self, scene_id: Uuid) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| matches!(c, OutputCall::Play(id, _) if *id == scene_id))
            .count()
    }

    pub fn calls(&self) -> Vec<OutputCall> {
        self.inner.lock().unwrap().calls.clone()
    }
}

impl AudioOutput for RecordingOutput {
    fn play(&mut self, scene_id: Uuid, audio: Arc<DecodedAudio>, gain: f32) {
        let mut inner = self.inner.lock().unwrap();
        inner.gains.insert(scene_id, gain);
        inner.rates.insert(scene_id, audio.sample_rate);
        inner.calls.push(OutputCall::Play(scene_id, gain));
    }

    fn set_gain(&mut self, scene_id: Uuid, gain: f32) {
        if let Some(current) = self.inner.lock().unwrap().gains.get_mut(&scene_id) {
            *current = gain;
        }
    }

    fn stop(&mut self, scene_id: Uuid) {
        let mut inner = self.inner.lock().unwrap();
        inner.gains.remove(&scene_id);
        inner.calls.push(OutputCall::Stop(scene_id));
    }

    fn stop_all(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        inner.gains.clear();
        inner.calls.push(OutputCall::StopAll);
    }

    fn output_rate(&self) -> Option<u32> {
        self.rate
    }
}

pub type TestScheduler = PlaybackScheduler<RecordingOutput, ManualClock>;

pub fn scheduler() -> (TestScheduler, RecordingOutput, ManualClock) {
    let output = RecordingOutput::default();
    let clock = ManualClock::default();
    (PlaybackScheduler::new(output.clone(), clock.clone()), output, clock)
}

pub fn scene(start: u32, end: u32, with_audio: bool) -> TimelineEntry {
    let scene_id = Uuid::new_v4();
    TimelineEntry {
        scene_id,
        scene_number: 0,
        start_page: start,
        end_page: end,
        page_spread_index: spread_index_for_page(start),
        asset: with_audio.then(|| TimelineAsset {
            soundscape_id: Uuid::new_v4(),
            audio_url: format!("/assets/generated/{}.wav", scene_id),
            duration_seconds: 30,
            source_type: SourceType::Generated,
        }),
    }
}

/// Scenes with audio covering consecutive page ranges
pub fn timeline(ranges: &[(u32, u32)]) -> Vec<TimelineEntry> {
    ranges.iter().map(|&(start, end)| scene(start, end, true)).collect()
}

pub fn loop_audio() -> Arc<DecodedAudio> {
    Arc::new(DecodedAudio {
        samples: vec![0.25; 2 * 480],
        sample_rate: 48_000,
    })
}

/// Report every queued request as loaded
pub fn complete_requests(scheduler: &mut TestScheduler) -> Vec<Uuid> {
    let requests = scheduler.preload_requests();
    for request in &requests {
        scheduler.on_load_finished(request, Ok(loop_audio()));
    }
    requests.into_iter().map(|r| r.scene_id).collect()
}

pub fn assert_gain(output: &RecordingOutput, scene_id: Uuid, expected: f32) {
    let gain = output.gain(scene_id).unwrap_or_else(|| panic!("{} has no voice", scene_id));
    assert!((gain - expected).abs() < EPSILON, "gain of {} is {}, expected {}", scene_id, gain, expected);
}

/// WAV file bytes of a 440 Hz sine
pub fn sine_wav(channels: u16, sample_rate: u32, frames: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut bytes = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let sample = ((t * 440.0 * std::f32::consts::TAU).sin() * 0.5 * i16::MAX as f32) as i16;
            for _ in 0..channels {
                writer.write_sample(sample).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    bytes
}

/// Loader serving WAV bytes by URL, failing unknown URLs
#[derive(Default)]
pub struct MemoryLoader {
    pub assets: Mutex<HashMap<String, Vec<u8>>>,
    pub loads: AtomicU32,
}

impl MemoryLoader {
    pub fn serve(&self, url: &str, bytes: Vec<u8>) {
        self.assets.lock().unwrap().insert(url.to_string(), bytes);
    }

    pub fn loads(&self) -> u32 {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetLoader for MemoryLoader {
    async fn load(&self, audio_url: &str) -> Result<Vec<u8>, PlayerError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.assets
            .lock()
            .unwrap()
            .get(audio_url)
            .cloned()
            .ok_or_else(|| PlayerError::Load(format!("{} not found", audio_url)))
    }
}
