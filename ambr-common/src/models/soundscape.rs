//! Soundscape records
//!
//! At most one soundscape is active per scene. Soundscapes are never mutated
//! in place; an override deletes the previous row and inserts a new one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{Error, Result};

pub const DEFAULT_DURATION_SECONDS: u32 = 30;
pub const MIN_DURATION_SECONDS: u32 = 30;
pub const MAX_DURATION_SECONDS: u32 = 60;

/// Clamp a requested loop duration into the supported 30-60s window
pub fn clamp_duration(seconds: u32) -> u32 {
    seconds.clamp(MIN_DURATION_SECONDS, MAX_DURATION_SECONDS)
}

/// Where a soundscape came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Admin-supplied asset
    Curated,
    /// Produced by the audio-synthesis capability
    Generated,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Curated => "curated",
            SourceType::Generated => "generated",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "curated" => Ok(SourceType::Curated),
            "generated" => Ok(SourceType::Generated),
            other => Err(Error::Validation(format!("Unknown source type '{}'", other))),
        }
    }
}

/// Tags stored with a soundscape
///
/// Fixed key set: mood, setting, intensity, weather, time_of_day.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SoundscapeTags {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<String>,
}

impl SoundscapeTags {
    /// Parse from an external JSON object, rejecting keys outside the fixed set
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Validation(format!("Invalid soundscape tags: {}", e)))
    }
}

impl From<&super::SceneDescriptors> for SoundscapeTags {
    fn from(descriptors: &super::SceneDescriptors) -> Self {
        Self {
            mood: descriptors.mood.clone(),
            setting: descriptors.setting.clone(),
            intensity: descriptors.activity_level.clone(),
            weather: descriptors.weather.clone(),
            time_of_day: descriptors.time_of_day.clone(),
        }
    }
}

/// Ambient audio loop bound to exactly one scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Soundscape {
    pub id: Uuid,
    pub scene_id: Uuid,
    /// Public URL under the system's own storage namespace
    pub audio_url: String,
    /// Storage key the URL was derived from
    pub asset_key: String,
    pub duration_seconds: u32,
    pub source_type: SourceType,
    /// Confidence in [0, 1], when the source reports one
    pub confidence: Option<f64>,
    /// External generation job reference
    pub generation_job_id: Option<String>,
    /// Prompt the asset was generated from
    pub prompt: Option<String>,
    /// Capability that produced the asset
    pub source_capability: Option<String>,
    /// Normalized cache key of the scene's descriptors
    pub fingerprint: String,
    pub tags: SoundscapeTags,
    pub created_at: DateTime<Utc>,
}

impl Soundscape {
    /// Check duration and confidence bounds
    pub fn validate(&self) -> Result<()> {
        if !(MIN_DURATION_SECONDS..=MAX_DURATION_SECONDS).contains(&self.duration_seconds) {
            return Err(Error::Validation(format!(
                "Soundscape duration {}s outside {}-{}s",
                self.duration_seconds, MIN_DURATION_SECONDS, MAX_DURATION_SECONDS
            )));
        }
        if let Some(confidence) = self.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(Error::Validation(format!(
                    "Soundscape confidence {} outside [0, 1]",
                    confidence
                )));
            }
        }
        if self.audio_url.trim().is_empty() {
            return Err(Error::Validation("Soundscape audio URL is empty".to_string()));
        }
        Ok(())
    }
}
