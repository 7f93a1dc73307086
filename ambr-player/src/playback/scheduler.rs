//! Playback scheduler
//!
//! Keeps the output in step with the reader's page. Every input arrives as a
//! method call on one `&mut self`: page navigation, a finished asset load,
//! or a tick that advances the current gain ramp. Nothing here blocks or
//! sleeps; fetching and decoding happen outside and come back through
//! [`PlaybackScheduler::on_asset_loaded`].
//!
//! # Transitions
//!
//! Each active scene has a voice on the output with a relative gain in
//! [0, 1]. A change of scene starts a [`Transition`] that takes the new
//! scene to 1.0 and every other voice to 0.0 over the ramp duration.
//! Navigating again mid-ramp replaces the transition with one that starts
//! from the gains reached so far. Voices at 0.0 when a ramp completes are
//! released. A scene that finishes loading after the outgoing loop has
//! already faded away still fades in from silence.
//!
//! # Sessions
//!
//! Every [`PlaybackScheduler::open`] starts a new session. Requests carry
//! the session they were issued in, and results reported for an older
//! session are dropped. A failed load is not retried until
//! [`LOAD_RETRY_AFTER`] has passed.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use ambr_common::models::{spread_index_for_page, TimelineEntry};

use super::preload::PreloadWindow;
use super::ramp::{GainRamp, Transition, CROSSFADE_DURATION};
use super::scene_timeline::SceneTimeline;
use crate::audio::{AudioOutput, DecodedAudio};
use crate::clock::Clock;
use crate::error::{PlayerError, Result};
use crate::state::PlayerState;

/// How long a failed asset is reported as failed before it is fetched again
pub const LOAD_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Asset the scheduler wants fetched and decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadRequest {
    pub scene_id: Uuid,
    pub audio_url: String,
    /// Session the request was issued in
    pub session: u64,
}

pub struct PlaybackScheduler<O: AudioOutput, C: Clock> {
    output: O,
    clock: C,
    timeline: SceneTimeline,
    state: PlayerState,
    /// Master volume in [0, 1]
    volume: f32,
    ramp_duration: Duration,
    session: u64,

    current_spread: Option<u32>,
    /// Scene under the reader; `None` on pages without a scene
    target: Option<Uuid>,

    buffers: PreloadWindow,
    /// Requested and not yet reported back
    in_flight: HashSet<Uuid>,
    /// Clock time of each failed load
    failed: HashMap<Uuid, Duration>,
    requests: VecDeque<PreloadRequest>,

    /// Relative gain of every voice on the output
    voices: HashMap<Uuid, f32>,
    transition: Option<Transition>,
    /// Scene that was audible when the pending load began
    outgoing: Option<Uuid>,
}

impl<O: AudioOutput, C: Clock> PlaybackScheduler<O, C> {
    pub fn new(output: O, clock: C) -> Self {
        Self {
            output,
            clock,
            timeline: SceneTimeline::default(),
            state: PlayerState::Idle,
            volume: 1.0,
            ramp_duration: CROSSFADE_DURATION,
            session: 0,
            current_spread: None,
            target: None,
            buffers: PreloadWindow::default(),
            in_flight: HashSet::new(),
            failed: HashMap::new(),
            requests: VecDeque::new(),
            voices: HashMap::new(),
            transition: None,
            outgoing: None,
        }
    }

    pub fn with_ramp_duration(mut self, duration: Duration) -> Self {
        self.ramp_duration = duration;
        self
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    /// Scenes with a decoded buffer ready
    pub fn preloaded(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }

    /// Session started by the last [`Self::open`]
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Start a reading session on a new timeline
    ///
    /// Silences the output and forgets every buffer and failure of the
    /// previous session. Loads still in flight for it are ignored when they
    /// report back through [`Self::on_load_finished`].
    pub fn open(&mut self, timeline: Vec<TimelineEntry>) {
        self.session += 1;
        self.output.stop_all();
        self.voices.clear();
        self.transition = None;
        self.outgoing = None;
        self.buffers.clear();
        self.in_flight.clear();
        self.failed.clear();
        self.requests.clear();
        self.current_spread = None;
        self.target = None;
        self.timeline = SceneTimeline::new(timeline);
        self.state = PlayerState::Idle;
        info!(scenes = self.timeline.len(), session = self.session, "Timeline opened");
    }

    /// The reader moved to `page`
    pub fn navigate(&mut self, page: u32) {
        let spread = spread_index_for_page(page);
        if self.current_spread != Some(spread) {
            self.current_spread = Some(spread);
            self.refresh_preload(spread);
        }

        let target = self.timeline.scene_for_page(page).map(|e| e.scene_id);
        if target == self.target {
            return;
        }
        debug!(page, from = ?self.target, to = ?target, "Scene changed");
        self.target = target;

        if let PlayerState::Paused { .. } = self.state {
            self.state = PlayerState::Paused { scene_id: target };
            return;
        }
        self.switch_to(target);
    }

    /// A fetch requested through [`Self::preload_requests`] finished
    ///
    /// Results for a session other than the current one are dropped.
    pub fn on_load_finished(&mut self, request: &PreloadRequest, result: Result<Arc<DecodedAudio>>) {
        if request.session != self.session {
            debug!(
                scene_id = %request.scene_id,
                session = request.session,
                current = self.session,
                "Dropping load from an earlier session"
            );
            return;
        }
        self.on_asset_loaded(request.scene_id, result);
    }

    /// Report a load for the current session
    pub fn on_asset_loaded(&mut self, scene_id: Uuid, result: Result<Arc<DecodedAudio>>) {
        self.in_flight.remove(&scene_id);
        let Some(last_spread) = self.timeline.entry(scene_id).map(|e| e.last_spread()) else {
            debug!(scene_id = %scene_id, "Load finished for a scene no longer on the timeline");
            return;
        };

        match result {
            Ok(audio) => {
                if self.target != Some(scene_id) && !self.in_window(scene_id) {
                    debug!(scene_id = %scene_id, "Dropping buffer outside the preload window");
                    return;
                }
                self.buffers.insert(scene_id, Arc::clone(&audio), last_spread);
                debug!(scene_id = %scene_id, seconds = audio.duration().as_secs_f32(), "Soundscape ready");

                if self.state == (PlayerState::Loading { scene_id }) {
                    self.start_scene(scene_id, audio);
                }
            }
            Err(e) => {
                warn!(scene_id = %scene_id, error = %e, "Soundscape failed to load");
                self.failed.insert(scene_id, self.clock.now());
                if self.state == (PlayerState::Loading { scene_id }) {
                    self.state = PlayerState::Error { scene_id };
                }
            }
        }
    }

    /// Advance the gain ramp to the clock's current time
    pub fn tick(&mut self) {
        let Some(transition) = &self.transition else {
            return;
        };
        let now = self.clock.now();
        let gains = transition.gains_at(now);
        let complete = transition.is_complete(now);

        for (scene_id, gain) in gains {
            self.voices.insert(scene_id, gain);
            self.output.set_gain(scene_id, gain * self.volume);
        }

        if complete {
            self.transition = None;
            self.release_silent(None);
            if let PlayerState::Crossfading { to, .. } = self.state {
                self.state = PlayerState::Playing { scene_id: to };
            }
        }
    }

    /// Stop all output immediately
    pub fn pause(&mut self) -> Result<()> {
        if !self.state.is_audible() {
            return Err(PlayerError::InvalidState(format!("Cannot pause while {}", self.state)));
        }
        self.output.stop_all();
        self.voices.clear();
        self.transition = None;
        self.outgoing = None;
        self.state = PlayerState::Paused { scene_id: self.target };
        debug!("Paused");
        Ok(())
    }

    /// Restart the current scene's loop from the beginning
    pub fn resume(&mut self) -> Result<()> {
        let PlayerState::Paused { .. } = self.state else {
            return Err(PlayerError::InvalidState(format!("Cannot resume while {}", self.state)));
        };
        self.state = PlayerState::Idle;
        self.switch_to(self.target);
        debug!(state = %self.state, "Resumed");
        Ok(())
    }

    /// Set the master volume, clamped to [0, 1]
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        for (scene_id, gain) in &self.voices {
            self.output.set_gain(*scene_id, gain * self.volume);
        }
    }

    /// Take the fetches queued since the last call, most urgent first
    pub fn preload_requests(&mut self) -> Vec<PreloadRequest> {
        self.requests.drain(..).collect()
    }

    fn switch_to(&mut self, target: Option<Uuid>) {
        let asset_url = target
            .and_then(|id| self.timeline.entry(id))
            .and_then(|e| e.asset.as_ref())
            .map(|a| a.audio_url.clone());

        let (Some(scene_id), Some(audio_url)) = (target, asset_url) else {
            // Text only
            self.outgoing = None;
            self.begin_transition(None);
            self.state = PlayerState::Idle;
            return;
        };

        if self.is_failed(scene_id) {
            self.outgoing = None;
            self.begin_transition(None);
            self.state = PlayerState::Error { scene_id };
        } else if let Some(audio) = self.buffers.get(scene_id) {
            self.start_scene(scene_id, audio);
        } else {
            self.outgoing = self.loudest_other(scene_id).or(self.outgoing);
            self.request(scene_id, audio_url, true);
            self.begin_transition(None);
            self.state = PlayerState::Loading { scene_id };
        }
    }

    /// Bring `scene_id` in, crossfading from whatever is audible
    ///
    /// If the scene replaces one that has already faded out while it was
    /// loading, it still fades in from silence.
    fn start_scene(&mut self, scene_id: Uuid, audio: Arc<DecodedAudio>) {
        let from = self
            .loudest_other(scene_id)
            .or(self.outgoing.filter(|id| *id != scene_id));
        self.outgoing = None;

        if !self.voices.contains_key(&scene_id) {
            let gain = if from.is_some() { 0.0 } else { 1.0 };
            self.output.play(scene_id, audio, gain * self.volume);
            self.voices.insert(scene_id, gain);
        }
        self.begin_transition(Some(scene_id));

        self.state = match from {
            Some(from) => PlayerState::Crossfading { from, to: scene_id },
            None => PlayerState::Playing { scene_id },
        };
        debug!(scene_id = %scene_id, state = %self.state, "Scene started");
    }

    /// Replace any running ramp with one toward `incoming`
    fn begin_transition(&mut self, incoming: Option<Uuid>) {
        let ramps: Vec<GainRamp> = self
            .voices
            .iter()
            .map(|(id, gain)| GainRamp {
                scene_id: *id,
                from: *gain,
                to: if Some(*id) == incoming { 1.0 } else { 0.0 },
            })
            .filter(|r| r.from != r.to)
            .collect();

        if ramps.is_empty() {
            self.transition = None;
            self.release_silent(incoming);
            return;
        }
        self.transition = Some(Transition::new(ramps, self.clock.now(), self.ramp_duration));
    }

    fn loudest_other(&self, scene_id: Uuid) -> Option<Uuid> {
        self.voices
            .iter()
            .filter(|(id, gain)| **id != scene_id && **gain > 0.0)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(id, _)| *id)
    }

    /// Failed recently enough that fetching again is pointless
    fn is_failed(&self, scene_id: Uuid) -> bool {
        self.failed
            .get(&scene_id)
            .is_some_and(|at| self.clock.now().saturating_sub(*at) < LOAD_RETRY_AFTER)
    }

    fn release_silent(&mut self, keep: Option<Uuid>) {
        let silent: Vec<Uuid> = self
            .voices
            .iter()
            .filter(|(id, gain)| **gain <= 0.0 && Some(**id) != keep)
            .map(|(id, _)| *id)
            .collect();
        for scene_id in silent {
            self.voices.remove(&scene_id);
            self.output.stop(scene_id);
        }
    }

    fn refresh_preload(&mut self, spread: u32) {
        let keep: Vec<Uuid> = self.voices.keys().copied().chain(self.target).collect();
        for scene_id in self.buffers.evict_behind(spread, &keep) {
            debug!(scene_id = %scene_id, spread, "Evicted soundscape buffer");
        }

        let wanted: Vec<(Uuid, String)> = self
            .timeline
            .scenes_for_spreads(PreloadWindow::window(spread))
            .into_iter()
            .filter_map(|e| e.asset.as_ref().map(|a| (e.scene_id, a.audio_url.clone())))
            .collect();
        for (scene_id, audio_url) in wanted {
            self.request(scene_id, audio_url, false);
        }
    }

    fn request(&mut self, scene_id: Uuid, audio_url: String, urgent: bool) {
        if let Some(pos) = self.requests.iter().position(|r| r.scene_id == scene_id) {
            if urgent {
                if let Some(queued) = self.requests.remove(pos) {
                    self.requests.push_front(queued);
                }
            }
            return;
        }
        if self.buffers.contains(scene_id) || self.in_flight.contains(&scene_id) || self.is_failed(scene_id) {
            return;
        }
        if self.failed.remove(&scene_id).is_some() {
            info!(scene_id = %scene_id, "Retrying soundscape load");
        }

        self.in_flight.insert(scene_id);
        let request = PreloadRequest {
            scene_id,
            audio_url,
            session: self.session,
        };
        if urgent {
            self.requests.push_front(request);
        } else {
            self.requests.push_back(request);
        }
    }

    fn in_window(&self, scene_id: Uuid) -> bool {
        let (Some(spread), Some(entry)) = (self.current_spread, self.timeline.entry(scene_id)) else {
            return false;
        };
        PreloadWindow::window(spread).any(|s| entry.covers_spread(s))
    }
}
