//! Playback scheduling: scene resolution, preloading and crossfades

pub mod preload;
pub mod ramp;
pub mod scene_timeline;
pub mod scheduler;

pub use preload::{PreloadWindow, PRELOAD_AHEAD_SPREADS};
pub use ramp::{GainRamp, Transition, CROSSFADE_DURATION};
pub use scene_timeline::SceneTimeline;
pub use scheduler::{PlaybackScheduler, PreloadRequest, LOAD_RETRY_AFTER};
