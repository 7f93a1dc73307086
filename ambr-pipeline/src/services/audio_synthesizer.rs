//! Audio-synthesis capability
//!
//! Opaque provider of ambient loops. Contract assumed of the HTTP variant:
//!
//! ```text
//! POST {endpoint}/generate   { "prompt": "...", "duration_seconds": 30 }
//! GET  {endpoint}/jobs/{id}
//!
//! both answer
//! { "job_id": "...", "status": "pending|done|failed",
//!   "asset_url": "https://...", "confidence": 0.9, "error": "..." }
//! ```
//!
//! `asset_url` points at the provider's own (ephemeral) storage and is
//! fetched with a plain GET.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;

use ambr_common::config::SynthesisConfig;

use crate::error::GenerationError;

/// What `synthesize` hands back
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisHandle {
    /// The provider rendered the asset synchronously
    Ready {
        job_id: Option<String>,
        asset_url: String,
        confidence: Option<f64>,
    },
    /// Poll `poll_status(job_id)` until done
    Pending { job_id: String },
}

/// Status of an external generation job
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Pending,
    Done {
        asset_url: String,
        confidence: Option<f64>,
    },
    Failed { reason: String },
}

#[async_trait]
pub trait AudioSynthesizer: Send + Sync {
    /// Capability name recorded as soundscape provenance
    fn name(&self) -> &str;

    async fn synthesize(&self, prompt: &str, duration_seconds: u32) -> Result<SynthesisHandle, GenerationError>;

    async fn poll_status(&self, job_id: &str) -> Result<JobStatus, GenerationError>;

    /// Download a finished asset from the provider
    async fn fetch_asset(&self, asset_url: &str) -> Result<Vec<u8>, GenerationError>;
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    #[serde(default)]
    job_id: Option<String>,
    status: String,
    #[serde(default)]
    asset_url: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

impl JobResponse {
    fn into_status(self) -> Result<JobStatus, GenerationError> {
        match self.status.as_str() {
            "pending" | "queued" | "running" => Ok(JobStatus::Pending),
            "done" | "succeeded" => {
                let asset_url = self
                    .asset_url
                    .filter(|u| !u.trim().is_empty())
                    .ok_or_else(|| GenerationError::InvalidResponse("done without asset_url".into()))?;
                Ok(JobStatus::Done {
                    asset_url,
                    confidence: self.confidence,
                })
            }
            "failed" => Ok(JobStatus::Failed {
                reason: self.error.unwrap_or_else(|| "generation failed".to_string()),
            }),
            other => Err(GenerationError::InvalidResponse(format!("unknown job status '{}'", other))),
        }
    }
}

type DirectLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// HTTP client for the audio-synthesis capability
pub struct HttpAudioSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    rate_limiter: DirectLimiter,
}

impl HttpAudioSynthesizer {
    pub fn new(config: &SynthesisConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ambr-pipeline/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| GenerationError::UpstreamUnavailable(e.to_string()))?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, GenerationError> {
        self.rate_limiter.until_ready().await;

        let response = self.authorized(request).send().await.map_err(transport_error)?;
        let status = response.status();

        match status.as_u16() {
            429 => Err(GenerationError::RateLimited),
            400 | 422 => {
                let body = response.text().await.unwrap_or_default();
                Err(GenerationError::UpstreamRejected(if body.is_empty() {
                    format!("status {}", status)
                } else {
                    body
                }))
            }
            _ if status.is_server_error() => {
                Err(GenerationError::UpstreamUnavailable(format!("status {}", status)))
            }
            _ if !status.is_success() => {
                Err(GenerationError::InvalidResponse(format!("status {}", status)))
            }
            _ => Ok(response),
        }
    }
}

fn transport_error(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout
    } else {
        GenerationError::UpstreamUnavailable(e.to_string())
    }
}

#[async_trait]
impl AudioSynthesizer for HttpAudioSynthesizer {
    fn name(&self) -> &str {
        "http-audio-synthesizer"
    }

    async fn synthesize(&self, prompt: &str, duration_seconds: u32) -> Result<SynthesisHandle, GenerationError> {
        let request = self
            .client
            .post(format!("{}/generate", self.endpoint))
            .json(&serde_json::json!({ "prompt": prompt, "duration_seconds": duration_seconds }));

        let job: JobResponse = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        let job_id = job.job_id.clone();
        match job.into_status()? {
            JobStatus::Done { asset_url, confidence } => Ok(SynthesisHandle::Ready {
                job_id,
                asset_url,
                confidence,
            }),
            JobStatus::Pending => {
                let job_id = job_id
                    .ok_or_else(|| GenerationError::InvalidResponse("pending job without job_id".into()))?;
                Ok(SynthesisHandle::Pending { job_id })
            }
            JobStatus::Failed { reason } => Err(GenerationError::UpstreamRejected(reason)),
        }
    }

    async fn poll_status(&self, job_id: &str) -> Result<JobStatus, GenerationError> {
        let request = self.client.get(format!("{}/jobs/{}", self.endpoint, job_id));
        let job: JobResponse = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        job.into_status()
    }

    async fn fetch_asset(&self, asset_url: &str) -> Result<Vec<u8>, GenerationError> {
        let response = self.send(self.client.get(asset_url)).await?;
        let bytes = response.bytes().await.map_err(transport_error)?;
        if bytes.is_empty() {
            return Err(GenerationError::InvalidResponse("empty asset".into()));
        }
        Ok(bytes.to_vec())
    }
}
