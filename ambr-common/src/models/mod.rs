//! Domain model shared by the pipeline and the player

mod book;
mod descriptor;
mod scene;
mod soundscape;
mod timeline;

pub use book::{Book, BookStatus, Page, ReadingProgress};
pub use descriptor::{Descriptor, Intensity, SceneDescriptors};
pub use scene::{validate_scene_ranges, Scene};
pub use soundscape::{
    clamp_duration, Soundscape, SoundscapeTags, SourceType, DEFAULT_DURATION_SECONDS,
    MAX_DURATION_SECONDS, MIN_DURATION_SECONDS,
};
pub use timeline::{spread_index_for_page, TimelineAsset, TimelineEntry};
