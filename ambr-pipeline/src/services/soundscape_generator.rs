//! Soundscape Generator
//!
//! Turns a scene prompt into a 30-60 second loop stored under the system's
//! own asset namespace.
//!
//! Two invocation modes:
//! - [`SoundscapeGenerator::generate`] blocks until the asset is stored, with
//!   transient failures retried under the backoff policy
//! - [`SoundscapeGenerator::submit`] returns a [`GenerationHandle`] right
//!   away; the caller polls it with [`GenerationHandle::poll_once`] or waits
//!   with [`GenerationHandle::wait`]
//!
//! Every outbound call carries `call_timeout`. Waiting on a job is bounded by
//! `poll_timeout` and stops early when the cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use ambr_common::config::SynthesisConfig;
use ambr_common::models::{clamp_duration, SourceType};

use super::asset_storage::{asset_key, detect_extension, AssetStorage};
use super::audio_synthesizer::{AudioSynthesizer, JobStatus, SynthesisHandle};
use super::soundscape_cache::AssetReference;
use crate::error::GenerationError;
use crate::utils::retry::{retry_transient, Attempted, RetryPolicy, Transient};

/// Timing knobs for the generator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorTimings {
    /// Limit on any single upstream call
    pub call_timeout: Duration,
    pub poll_interval: Duration,
    /// Limit on waiting for one job to finish
    pub poll_timeout: Duration,
}

impl GeneratorTimings {
    pub fn from_config(config: &SynthesisConfig) -> Self {
        Self {
            call_timeout: config.timeout(),
            poll_interval: config.poll_interval(),
            poll_timeout: config.poll_timeout(),
        }
    }
}

impl Default for GeneratorTimings {
    fn default() -> Self {
        Self::from_config(&SynthesisConfig::default())
    }
}

/// A finished upstream job, before its asset is copied into storage
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedJob {
    pub job_id: Option<String>,
    /// Provider URL of the rendered asset
    pub asset_url: String,
    pub confidence: Option<f64>,
}

async fn bounded<T, F>(call_timeout: Duration, call: F) -> Result<T, GenerationError>
where
    F: std::future::Future<Output = Result<T, GenerationError>>,
{
    match tokio::time::timeout(call_timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(GenerationError::Timeout),
    }
}

/// Handle to a submitted generation job
pub struct GenerationHandle {
    synthesizer: Arc<dyn AudioSynthesizer>,
    timings: GeneratorTimings,
    cancel: CancellationToken,
    job_id: Option<String>,
    completed: Option<CompletedJob>,
}

impl GenerationHandle {
    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    /// Check the job once
    ///
    /// `Ok(None)` while the job is still running. A failed job is an
    /// `UpstreamRejected` error carrying the provider's reason.
    pub async fn poll_once(&mut self) -> Result<Option<CompletedJob>, GenerationError> {
        if let Some(done) = &self.completed {
            return Ok(Some(done.clone()));
        }
        let Some(job_id) = self.job_id.clone() else {
            return Err(GenerationError::InvalidResponse("job has no id to poll".into()));
        };

        let status = bounded(self.timings.call_timeout, self.synthesizer.poll_status(&job_id)).await?;
        match status {
            JobStatus::Pending => Ok(None),
            JobStatus::Done { asset_url, confidence } => {
                let done = CompletedJob {
                    job_id: Some(job_id),
                    asset_url,
                    confidence,
                };
                self.completed = Some(done.clone());
                Ok(Some(done))
            }
            JobStatus::Failed { reason } => Err(GenerationError::UpstreamRejected(reason)),
        }
    }

    /// Poll at the configured interval until the job finishes
    ///
    /// Transient poll errors are logged and polling continues. Gives up with
    /// `Timeout` after `poll_timeout` and with `Cancelled` when cancelled.
    pub async fn wait(mut self) -> Result<CompletedJob, GenerationError> {
        if let Some(done) = self.completed.take() {
            return Ok(done);
        }

        let poll_timeout = self.timings.poll_timeout;
        let cancel = self.cancel.clone();
        let job_id = self.job_id.clone().unwrap_or_default();

        let polling = async {
            let mut ticker = tokio::time::interval(self.timings.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                    _ = ticker.tick() => {}
                }

                match self.poll_once().await {
                    Ok(Some(done)) => return Ok(done),
                    Ok(None) => tracing::trace!(job_id = %job_id, "Generation job still pending"),
                    Err(e) if e.is_transient() => {
                        tracing::warn!(job_id = %job_id, error = %e, "Polling generation job failed, will poll again");
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        match tokio::time::timeout(poll_timeout, polling).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    job_id = %job_id,
                    poll_timeout_ms = poll_timeout.as_millis() as u64,
                    "Generation job did not finish in time"
                );
                Err(GenerationError::Timeout)
            }
        }
    }
}

pub struct SoundscapeGenerator {
    synthesizer: Arc<dyn AudioSynthesizer>,
    storage: Arc<dyn AssetStorage>,
    policy: RetryPolicy,
    timings: GeneratorTimings,
    cancel: CancellationToken,
}

impl SoundscapeGenerator {
    pub fn new(
        synthesizer: Arc<dyn AudioSynthesizer>,
        storage: Arc<dyn AssetStorage>,
        policy: RetryPolicy,
        timings: GeneratorTimings,
    ) -> Self {
        Self {
            synthesizer,
            storage,
            policy,
            timings,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop waiting on jobs when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn capability_name(&self) -> &str {
        self.synthesizer.name()
    }

    /// Submit a job without waiting for it
    pub async fn submit(&self, prompt: &str, duration_seconds: u32) -> Result<GenerationHandle, GenerationError> {
        let duration = clamp_duration(duration_seconds);
        let handle = bounded(self.timings.call_timeout, self.synthesizer.synthesize(prompt, duration)).await?;

        let (job_id, completed) = match handle {
            SynthesisHandle::Ready {
                job_id,
                asset_url,
                confidence,
            } => (
                job_id.clone(),
                Some(CompletedJob {
                    job_id,
                    asset_url,
                    confidence,
                }),
            ),
            SynthesisHandle::Pending { job_id } => (Some(job_id), None),
        };

        tracing::debug!(job_id = ?job_id, ready = completed.is_some(), "Submitted generation job");

        Ok(GenerationHandle {
            synthesizer: Arc::clone(&self.synthesizer),
            timings: self.timings,
            cancel: self.cancel.clone(),
            job_id,
            completed,
        })
    }

    /// Generate, fetch and store a loop for `scene_id`
    ///
    /// Retries transient failures of the submit/wait/fetch sequence. Storage
    /// failures are retried once, then reported as `Storage`. `attempts`
    /// counts upstream generation attempts.
    pub async fn generate(
        &self,
        scene_id: Uuid,
        prompt: &str,
        duration_seconds: u32,
    ) -> Attempted<AssetReference, GenerationError> {
        let duration = clamp_duration(duration_seconds);

        let rendered = retry_transient("generate", &self.policy, |attempt| async move {
            tracing::debug!(scene_id = %scene_id, attempt, "Requesting soundscape generation");
            let job = self.submit(prompt, duration).await?.wait().await?;
            let bytes = bounded(self.timings.call_timeout, self.synthesizer.fetch_asset(&job.asset_url)).await?;
            Ok::<_, GenerationError>((job, bytes))
        })
        .await;

        let attempts = rendered.attempts;
        let result = match rendered.result {
            Ok((job, bytes)) => self.persist(scene_id, prompt, duration, job, &bytes).await,
            Err(e) => Err(e),
        };

        Attempted { result, attempts }
    }

    /// Copy rendered bytes into storage under the system's key scheme
    async fn persist(
        &self,
        scene_id: Uuid,
        prompt: &str,
        duration_seconds: u32,
        job: CompletedJob,
        bytes: &[u8],
    ) -> Result<AssetReference, GenerationError> {
        let key = asset_key(SourceType::Generated, scene_id, detect_extension(bytes));

        let audio_url = match self.storage.put(&key, bytes).await {
            Ok(url) => url,
            Err(first) => {
                tracing::warn!(key = %key, error = %first, "Asset upload failed, retrying once");
                self.storage
                    .put(&key, bytes)
                    .await
                    .map_err(|e| GenerationError::Storage(e.to_string()))?
            }
        };

        Ok(AssetReference {
            audio_url,
            asset_key: key,
            duration_seconds,
            source_type: SourceType::Generated,
            confidence: job.confidence.filter(|c| (0.0..=1.0).contains(c)),
            generation_job_id: job.job_id,
            prompt: Some(prompt.to_string()),
            source_capability: Some(self.synthesizer.name().to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambr_common::{Error, Result};
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    const WAV: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt \x10\x00\x00\x00";

    #[derive(Default)]
    struct FakeSynth {
        submits: Mutex<VecDeque<std::result::Result<SynthesisHandle, GenerationError>>>,
        polls: Mutex<VecDeque<std::result::Result<JobStatus, GenerationError>>>,
        submit_calls: AtomicU32,
        poll_calls: AtomicU32,
    }

    #[async_trait]
    impl AudioSynthesizer for FakeSynth {
        fn name(&self) -> &str {
            "fake-synth"
        }

        async fn synthesize(&self, _prompt: &str, _duration: u32) -> std::result::Result<SynthesisHandle, GenerationError> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            self.submits
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(GenerationError::UpstreamUnavailable("exhausted".into())))
        }

        async fn poll_status(&self, _job_id: &str) -> std::result::Result<JobStatus, GenerationError> {
            self.poll_calls.fetch_add(1, Ordering::SeqCst);
            self.polls.lock().unwrap().pop_front().unwrap_or(Ok(JobStatus::Pending))
        }

        async fn fetch_asset(&self, _asset_url: &str) -> std::result::Result<Vec<u8>, GenerationError> {
            Ok(WAV.to_vec())
        }
    }

    #[derive(Default)]
    struct MemoryStorage {
        objects: Mutex<HashMap<String, Vec<u8>>>,
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl AssetStorage for MemoryStorage {
        async fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::Storage("disk full".into()));
            }
            self.objects.lock().unwrap().insert(key.to_string(), bytes.to_vec());
            Ok(self.url_for(key))
        }

        async fn get(&self, key: &str) -> Result<Vec<u8>> {
            self.objects
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| Error::NotFound(key.to_string()))
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.objects.lock().unwrap().remove(key);
            Ok(())
        }

        fn url_for(&self, key: &str) -> String {
            format!("/assets/{}", key)
        }
    }

    fn ready(url: &str) -> std::result::Result<SynthesisHandle, GenerationError> {
        Ok(SynthesisHandle::Ready {
            job_id: Some("job-1".into()),
            asset_url: url.into(),
            confidence: Some(0.9),
        })
    }

    fn generator(synth: Arc<FakeSynth>, storage: Arc<MemoryStorage>) -> SoundscapeGenerator {
        let timings = GeneratorTimings {
            call_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(3),
            poll_timeout: Duration::from_secs(300),
        };
        SoundscapeGenerator::new(synth, storage, RetryPolicy::default(), timings)
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_stores_under_own_namespace() {
        let synth = Arc::new(FakeSynth::default());
        synth.submits.lock().unwrap().push_back(ready("https://provider.example/tmp/abc.wav"));
        let storage = Arc::new(MemoryStorage::default());
        let scene_id = Uuid::new_v4();

        let outcome = generator(synth, storage.clone())
            .generate(scene_id, "calm forest ambience", 30)
            .await;

        let asset = outcome.result.unwrap();
        assert_eq!(outcome.attempts, 1);
        assert_eq!(asset.duration_seconds, 30);
        assert_eq!(asset.audio_url, format!("/assets/audio/generated/{}.wav", scene_id));
        assert!(!asset.audio_url.contains("provider.example"));
        assert_eq!(asset.prompt.as_deref(), Some("calm forest ambience"));
        assert_eq!(asset.source_capability.as_deref(), Some("fake-synth"));
        assert_eq!(asset.generation_job_id.as_deref(), Some("job-1"));
        assert!(storage.objects.lock().unwrap().contains_key(&asset.asset_key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_clamped_into_window() {
        let synth = Arc::new(FakeSynth::default());
        synth.submits.lock().unwrap().push_back(ready("https://p/a.wav"));
        let outcome = generator(synth, Arc::new(MemoryStorage::default()))
            .generate(Uuid::new_v4(), "storm", 120)
            .await;
        assert_eq!(outcome.result.unwrap().duration_seconds, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_transient_failures_then_success() {
        let synth = Arc::new(FakeSynth::default());
        {
            let mut submits = synth.submits.lock().unwrap();
            submits.push_back(Err(GenerationError::RateLimited));
            submits.push_back(Err(GenerationError::Timeout));
            submits.push_back(ready("https://p/a.wav"));
        }

        let outcome = generator(synth.clone(), Arc::new(MemoryStorage::default()))
            .generate(Uuid::new_v4(), "rain", 30)
            .await;

        assert!(outcome.is_ok());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(synth.submit_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_prompt_not_retried() {
        let synth = Arc::new(FakeSynth::default());
        synth
            .submits
            .lock()
            .unwrap()
            .push_back(Err(GenerationError::UpstreamRejected("policy filter".into())));

        let outcome = generator(synth.clone(), Arc::new(MemoryStorage::default()))
            .generate(Uuid::new_v4(), "forbidden", 30)
            .await;

        assert!(matches!(outcome.result, Err(GenerationError::UpstreamRejected(_))));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(synth.submit_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_then_poll() {
        let synth = Arc::new(FakeSynth::default());
        synth
            .submits
            .lock()
            .unwrap()
            .push_back(Ok(SynthesisHandle::Pending { job_id: "job-9".into() }));
        {
            let mut polls = synth.polls.lock().unwrap();
            polls.push_back(Ok(JobStatus::Pending));
            polls.push_back(Err(GenerationError::RateLimited));
            polls.push_back(Ok(JobStatus::Done {
                asset_url: "https://p/a.wav".into(),
                confidence: None,
            }));
        }
        let gen = generator(synth.clone(), Arc::new(MemoryStorage::default()));

        let mut handle = gen.submit("waves", 30).await.unwrap();
        assert_eq!(handle.job_id(), Some("job-9"));
        assert_eq!(handle.poll_once().await.unwrap(), None);

        let start = tokio::time::Instant::now();
        let done = handle.wait().await.unwrap();

        assert_eq!(done.job_id.as_deref(), Some("job-9"));
        assert_eq!(synth.poll_calls.load(Ordering::SeqCst), 3);
        // Immediate poll, then one interval
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let synth = Arc::new(FakeSynth::default());
        synth
            .submits
            .lock()
            .unwrap()
            .push_back(Ok(SynthesisHandle::Pending { job_id: "slow".into() }));
        let gen = generator(synth, Arc::new(MemoryStorage::default()));

        let handle = gen.submit("waves", 30).await.unwrap();
        assert_eq!(handle.wait().await, Err(GenerationError::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_cancelled() {
        let synth = Arc::new(FakeSynth::default());
        synth
            .submits
            .lock()
            .unwrap()
            .push_back(Ok(SynthesisHandle::Pending { job_id: "slow".into() }));
        let token = CancellationToken::new();
        let gen = generator(synth, Arc::new(MemoryStorage::default())).with_cancellation(token.clone());

        let handle = gen.submit("waves", 30).await.unwrap();
        let waiting = tokio::spawn(handle.wait());
        tokio::time::sleep(Duration::from_secs(10)).await;
        token.cancel();

        assert_eq!(waiting.await.unwrap(), Err(GenerationError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_is_rejection() {
        let synth = Arc::new(FakeSynth::default());
        synth
            .submits
            .lock()
            .unwrap()
            .push_back(Ok(SynthesisHandle::Pending { job_id: "j".into() }));
        synth.polls.lock().unwrap().push_back(Ok(JobStatus::Failed {
            reason: "unsafe prompt".into(),
        }));
        let gen = generator(synth, Arc::new(MemoryStorage::default()));

        let outcome = gen.generate(Uuid::new_v4(), "x", 30).await;
        assert_eq!(
            outcome.result,
            Err(GenerationError::UpstreamRejected("unsafe prompt".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_retried_once() {
        let storage = Arc::new(MemoryStorage::default());
        storage.failures_left.store(1, Ordering::SeqCst);
        let synth = Arc::new(FakeSynth::default());
        synth.submits.lock().unwrap().push_back(ready("https://p/a.wav"));

        let outcome = generator(synth, storage.clone())
            .generate(Uuid::new_v4(), "x", 30)
            .await;
        assert!(outcome.is_ok());

        storage.failures_left.store(2, Ordering::SeqCst);
        let synth = Arc::new(FakeSynth::default());
        synth.submits.lock().unwrap().push_back(ready("https://p/b.wav"));
        let outcome = generator(synth, storage).generate(Uuid::new_v4(), "y", 30).await;
        assert!(matches!(outcome.result, Err(GenerationError::Storage(_))));
    }
}
