//! Player state

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// State of one reading session's audio
///
/// `Idle → Loading → Playing → Crossfading → Playing`, with `Paused` entered
/// from `Playing` or `Crossfading` and `Error` entered when the asset of the
/// scene under the reader fails to load. Pages of a scene without audio are
/// read in `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PlayerState {
    #[default]
    Idle,
    Loading { scene_id: Uuid },
    Playing { scene_id: Uuid },
    Crossfading { from: Uuid, to: Uuid },
    /// `scene_id` is the scene that resumes, `None` if the reader is on a
    /// page without audio
    Paused { scene_id: Option<Uuid> },
    Error { scene_id: Uuid },
}

impl PlayerState {
    pub fn name(&self) -> &'static str {
        match self {
            PlayerState::Idle => "idle",
            PlayerState::Loading { .. } => "loading",
            PlayerState::Playing { .. } => "playing",
            PlayerState::Crossfading { .. } => "crossfading",
            PlayerState::Paused { .. } => "paused",
            PlayerState::Error { .. } => "error",
        }
    }

    /// Whether audio is coming out of the output
    pub fn is_audible(&self) -> bool {
        matches!(self, PlayerState::Playing { .. } | PlayerState::Crossfading { .. })
    }
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerState::Idle => write!(f, "idle"),
            PlayerState::Loading { scene_id } => write!(f, "loading({})", scene_id),
            PlayerState::Playing { scene_id } => write!(f, "playing({})", scene_id),
            PlayerState::Crossfading { from, to } => write!(f, "crossfading({} -> {})", from, to),
            PlayerState::Paused { scene_id: Some(id) } => write!(f, "paused({})", id),
            PlayerState::Paused { scene_id: None } => write!(f, "paused"),
            PlayerState::Error { scene_id } => write!(f, "error({})", scene_id),
        }
    }
}
