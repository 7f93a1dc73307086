//! Content-analysis capability
//!
//! `analyze(text) -> Descriptor` over HTTP. The capability is opaque; only
//! its request/response contract is assumed:
//!
//! ```text
//! POST {endpoint}
//! { "text": "...", "options": { "pages_per_window": 2 } }
//!
//! 200 { "setting": "...", "mood": "...", "weather": null,
//!       "time_of_day": "night", "intensity": "low|medium|high",
//!       "audio_prompt": "..." }
//! ```

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;

use ambr_common::config::AnalysisConfig;
use ambr_common::models::{Descriptor, Intensity};

use crate::error::AnalysisError;

const USER_AGENT: &str = concat!("ambr-pipeline/", env!("CARGO_PKG_VERSION"));

/// Options recognized by the analysis capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    /// Target analysis granularity in pages (2 = one spread)
    pub pages_per_window: u32,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self { pages_per_window: 2 }
    }
}

/// Produces a narrative descriptor from plain text
#[async_trait]
pub trait ContentAnalyzer: Send + Sync {
    /// Capability name recorded in logs
    fn name(&self) -> &str;

    async fn analyze(&self, text: &str, options: &AnalysisOptions) -> Result<Descriptor, AnalysisError>;
}

/// Wire format of an analysis response
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DescriptorResponse {
    setting: String,
    mood: String,
    #[serde(default)]
    weather: Option<String>,
    #[serde(default)]
    time_of_day: Option<String>,
    intensity: String,
    #[serde(default)]
    audio_prompt: Option<String>,
}

/// Parse an analysis response body
///
/// Unknown keys, missing required fields and unknown intensity levels are
/// all `InvalidResponse`.
pub fn parse_descriptor_json(body: &str) -> Result<Descriptor, AnalysisError> {
    let response: DescriptorResponse =
        serde_json::from_str(body).map_err(|e| AnalysisError::InvalidResponse(e.to_string()))?;

    let intensity: Intensity = response
        .intensity
        .parse()
        .map_err(|_| AnalysisError::InvalidResponse(format!("unknown intensity '{}'", response.intensity)))?;

    let clean = |value: Option<String>| value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    Ok(Descriptor {
        setting: response.setting.trim().to_string(),
        mood: response.mood.trim().to_string(),
        weather: clean(response.weather),
        time_of_day: clean(response.time_of_day),
        intensity,
        audio_prompt: response.audio_prompt.unwrap_or_default().trim().to_string(),
    })
}

type DirectLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// HTTP client for the content-analysis capability
pub struct HttpContentAnalyzer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    rate_limiter: DirectLimiter,
}

impl HttpContentAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| AnalysisError::UpstreamUnavailable(e.to_string()))?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }
}

#[async_trait]
impl ContentAnalyzer for HttpContentAnalyzer {
    fn name(&self) -> &str {
        "http-content-analyzer"
    }

    async fn analyze(&self, text: &str, options: &AnalysisOptions) -> Result<Descriptor, AnalysisError> {
        self.rate_limiter.until_ready().await;

        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "text": text, "options": options }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        tracing::debug!(chars = text.chars().count(), "Requesting content analysis");

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AnalysisError::Timeout
            } else {
                AnalysisError::UpstreamUnavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AnalysisError::RateLimited);
        }
        if status.is_server_error() {
            return Err(AnalysisError::UpstreamUnavailable(format!("status {}", status)));
        }
        if !status.is_success() {
            return Err(AnalysisError::InvalidResponse(format!("status {}", status)));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                AnalysisError::Timeout
            } else {
                AnalysisError::UpstreamUnavailable(e.to_string())
            }
        })?;

        parse_descriptor_json(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_response() {
        let descriptor = parse_descriptor_json(
            r#"{"setting":" Forest ","mood":"calm","weather":"","time_of_day":"dusk",
                "intensity":"LOW","audio_prompt":"calm forest ambience"}"#,
        )
        .unwrap();

        assert_eq!(descriptor.setting, "Forest");
        assert_eq!(descriptor.weather, None);
        assert_eq!(descriptor.time_of_day.as_deref(), Some("dusk"));
        assert_eq!(descriptor.intensity, Intensity::Low);
        assert_eq!(descriptor.audio_prompt, "calm forest ambience");
    }

    #[test]
    fn test_missing_required_field_is_invalid() {
        let err = parse_descriptor_json(r#"{"setting":"forest","intensity":"low"}"#).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidResponse(_)));
    }

    #[test]
    fn test_unknown_key_is_invalid() {
        let err = parse_descriptor_json(
            r#"{"setting":"forest","mood":"calm","intensity":"low","genre":"folk"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidResponse(_)));
    }

    #[test]
    fn test_unknown_intensity_is_invalid() {
        let err = parse_descriptor_json(r#"{"setting":"forest","mood":"calm","intensity":"extreme"}"#)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidResponse(_)));
    }

    #[test]
    fn test_malformed_json_is_invalid() {
        assert!(matches!(
            parse_descriptor_json("not json"),
            Err(AnalysisError::InvalidResponse(_))
        ));
    }
}
