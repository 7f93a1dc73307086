//! Audio subsystem: decoding, resampling, fetching and the loop mixer

pub mod decode;
pub mod loader;
pub mod mixer;
pub mod output;
pub mod resampler;

pub use decode::{decode_bytes, DecodedAudio};
pub use loader::{extension_hint, AssetLoader, HttpAssetLoader};
pub use mixer::LoopMixer;
pub use output::AudioOutput;
pub use resampler::resample;
