//! # ambr-player
//!
//! Reader-side soundscape playback.
//!
//! **Purpose:** Keep one looping ambient soundscape in step with the page the
//! reader is on. Scenes ahead of the reader are fetched and decoded early, a
//! change of scene crossfades the two loops, and a missing asset never holds
//! up page turns.
//!
//! **Architecture:** [`PlaybackScheduler`] is a synchronous state machine
//! driven by navigation, load completions and ticks. It talks to audio
//! through the [`AudioOutput`] gain sink and reads time from a [`Clock`], so
//! both can be faked. [`SchedulerHandle`] runs it on a single tokio task.

pub mod audio;
pub mod clock;
pub mod error;
pub mod handle;
pub mod playback;
pub mod state;

pub use audio::{decode_bytes, resample, AssetLoader, AudioOutput, DecodedAudio, HttpAssetLoader, LoopMixer};
pub use clock::{Clock, SystemClock};
pub use error::{PlayerError, Result};
pub use handle::SchedulerHandle;
pub use playback::{PlaybackScheduler, PreloadRequest, SceneTimeline, LOAD_RETRY_AFTER};
pub use state::PlayerState;
