//! Timed gain ramps
//!
//! A [`Transition`] moves every active voice from the gain it had when the
//! transition began to its target (1.0 for the incoming scene, 0.0 for the
//! rest). Gains here are relative; the scheduler multiplies in the master
//! volume when it hands them to the output.

use std::time::Duration;

use uuid::Uuid;

use ambr_common::FadeCurve;

pub const CROSSFADE_DURATION: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainRamp {
    pub scene_id: Uuid,
    pub from: f32,
    pub to: f32,
}

#[derive(Debug, Clone)]
pub struct Transition {
    ramps: Vec<GainRamp>,
    started_at: Duration,
    duration: Duration,
    curve: FadeCurve,
}

impl Transition {
    pub fn new(ramps: Vec<GainRamp>, started_at: Duration, duration: Duration) -> Self {
        Self {
            ramps,
            started_at,
            duration,
            curve: FadeCurve::Linear,
        }
    }

    pub fn ramps(&self) -> &[GainRamp] {
        &self.ramps
    }

    /// Normalized progress in [0, 1]
    pub fn progress(&self, now: Duration) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_sub(self.started_at);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    pub fn gains_at(&self, now: Duration) -> Vec<(Uuid, f32)> {
        let t = self.progress(now);
        self.ramps
            .iter()
            .map(|r| (r.scene_id, self.curve.interpolate(r.from, r.to, t)))
            .collect()
    }

    pub fn is_complete(&self, now: Duration) -> bool {
        self.progress(now) >= 1.0
    }
}
