//! Narrative descriptors
//!
//! A [`Descriptor`] is what the content-analysis capability returns for one
//! spread. A [`SceneDescriptors`] is the closed set of tags persisted with a
//! scene; unknown keys are rejected when parsing external JSON.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Narrative intensity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Low,
    Medium,
    High,
}

impl Default for Intensity {
    fn default() -> Self {
        Intensity::Medium
    }
}

impl Intensity {
    /// Ordinal level (low=0, medium=1, high=2)
    pub fn level(&self) -> u8 {
        match self {
            Intensity::Low => 0,
            Intensity::Medium => 1,
            Intensity::High => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intensity::Low => "low",
            Intensity::Medium => "medium",
            Intensity::High => "high",
        }
    }

    /// Number of levels between two intensities
    pub fn distance(&self, other: Intensity) -> u8 {
        self.level().abs_diff(other.level())
    }
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intensity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Intensity::Low),
            "medium" => Ok(Intensity::Medium),
            "high" => Ok(Intensity::High),
            other => Err(Error::Validation(format!("Unknown intensity '{}'", other))),
        }
    }
}

/// Structured narrative metadata for one spread
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Descriptor {
    pub setting: String,
    pub mood: String,
    pub weather: Option<String>,
    pub time_of_day: Option<String>,
    pub intensity: Intensity,
    /// Free-text prompt for the audio-synthesis capability
    pub audio_prompt: String,
}

impl Descriptor {
    /// Neutral descriptor used when analysis permanently fails for a spread
    pub fn neutral() -> Self {
        Self::default()
    }

    /// Prompt for synthesis, derived from the tags when analysis gave none
    pub fn prompt(&self) -> String {
        if !self.audio_prompt.trim().is_empty() {
            return self.audio_prompt.trim().to_string();
        }

        let mut parts = vec!["ambient soundscape".to_string()];
        for value in [
            Some(self.setting.as_str()),
            Some(self.mood.as_str()),
            self.weather.as_deref(),
            self.time_of_day.as_deref(),
        ]
        .into_iter()
        .flatten()
        {
            if !value.trim().is_empty() {
                parts.push(value.trim().to_string());
            }
        }
        parts.push(format!("{} intensity", self.intensity));
        parts.join(", ")
    }
}

/// Tags persisted with a scene
///
/// Fixed key set: setting, mood, weather, time_of_day, activity_level,
/// atmosphere, scene_type, dominant_elements.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneDescriptors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<String>,
    /// Intensity of the opening spread (low/medium/high)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atmosphere: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_elements: Option<String>,
}

impl SceneDescriptors {
    /// Parse from an external JSON object, rejecting keys outside the fixed set
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json)
            .map_err(|e| Error::Validation(format!("Invalid scene descriptors: {}", e)))
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Intensity recorded as activity level, if parseable
    pub fn intensity(&self) -> Option<Intensity> {
        self.activity_level.as_deref().and_then(|s| s.parse().ok())
    }
}

impl From<&Descriptor> for SceneDescriptors {
    fn from(descriptor: &Descriptor) -> Self {
        fn non_empty(value: &str) -> Option<String> {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }

        Self {
            setting: non_empty(&descriptor.setting),
            mood: non_empty(&descriptor.mood),
            weather: descriptor.weather.as_deref().and_then(non_empty),
            time_of_day: descriptor.time_of_day.as_deref().and_then(non_empty),
            activity_level: Some(descriptor.intensity.as_str().to_string()),
            atmosphere: None,
            scene_type: None,
            dominant_elements: None,
        }
    }
}
