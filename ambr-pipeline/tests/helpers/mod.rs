//! Test Helper Utilities
//!
//! Scripted upstream capabilities, in-memory asset storage and a pipeline
//! builder over an in-memory database.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use ambr_common::db::{books, init_memory_database};
use ambr_common::events::EventBus;
use ambr_common::models::{Book, BookStatus, Descriptor, Intensity};
use ambr_common::{Error, Result};
use ambr_pipeline::services::{
    AnalysisOptions, AssetStorage, AudioSynthesizer, BookQueue, ContentAnalyzer,
    DescriptorExtractor, GeneratorTimings, JobQueues, JobStatus, PipelineOrchestrator,
    PipelineServices, PipelineSettings, SoundscapeGenerator, StagedDocument, StagedTextSource,
    SynthesisHandle,
};
use ambr_pipeline::utils::retry::RetryPolicy;
use ambr_pipeline::{AnalysisError, AppState, GenerationError};

/// Minimal RIFF/WAVE header, enough for format sniffing
pub const WAV: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt \x10\x00\x00\x00";

pub fn descriptor(setting: &str, mood: &str, intensity: Intensity) -> Descriptor {
    Descriptor {
        setting: setting.to_string(),
        mood: mood.to_string(),
        weather: None,
        time_of_day: None,
        intensity,
        audio_prompt: format!("{} {} ambience", mood, setting),
    }
}

/// Descriptor for the two settings most tests use
///
/// Spread text mentioning "castle" is a tense castle; everything else is a
/// calm forest.
pub fn forest_or_castle(text: &str) -> std::result::Result<Descriptor, AnalysisError> {
    if text.contains("castle") {
        Ok(descriptor("castle", "tense", Intensity::High))
    } else {
        Ok(descriptor("forest", "calm", Intensity::Low))
    }
}

type AnalyzeFn = dyn Fn(&str) -> std::result::Result<Descriptor, AnalysisError> + Send + Sync;

/// Content analyzer answering from a function of the spread text
pub struct ScriptedAnalyzer {
    script: Box<AnalyzeFn>,
    pub calls: AtomicU32,
}

impl ScriptedAnalyzer {
    pub fn new(
        script: impl Fn(&str) -> std::result::Result<Descriptor, AnalysisError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentAnalyzer for ScriptedAnalyzer {
    fn name(&self) -> &str {
        "scripted-analyzer"
    }

    async fn analyze(&self, text: &str, _options: &AnalysisOptions) -> std::result::Result<Descriptor, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(text)
    }
}

/// Synthesizer that finishes every job immediately
///
/// Prompts containing a rejected word fail with `UpstreamRejected`.
#[derive(Default)]
pub struct ScriptedSynthesizer {
    rejected_words: Mutex<HashSet<String>>,
    pub prompts: Mutex<Vec<String>>,
    pub calls: AtomicU32,
    hold_until: AtomicU32,
}

impl ScriptedSynthesizer {
    pub fn reject_prompts_containing(&self, word: &str) {
        self.rejected_words.lock().unwrap().insert(word.to_string());
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Hold each call until `calls` calls have arrived, or about half a second passes
    pub fn hold_until_calls(&self, calls: u32) {
        self.hold_until.store(calls, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudioSynthesizer for ScriptedSynthesizer {
    fn name(&self) -> &str {
        "scripted-synth"
    }

    async fn synthesize(&self, prompt: &str, _duration_seconds: u32) -> std::result::Result<SynthesisHandle, GenerationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompts.lock().unwrap().push(prompt.to_string());

        let hold_until = self.hold_until.load(Ordering::SeqCst);
        for _ in 0..100 {
            if self.calls() >= hold_until {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        if self.rejected_words.lock().unwrap().iter().any(|w| prompt.contains(w.as_str())) {
            return Err(GenerationError::UpstreamRejected("content policy".into()));
        }
        Ok(SynthesisHandle::Ready {
            job_id: Some(format!("job-{}", call)),
            asset_url: format!("https://provider.example/tmp/{}.wav", call),
            confidence: Some(0.8),
        })
    }

    async fn poll_status(&self, _job_id: &str) -> std::result::Result<JobStatus, GenerationError> {
        Ok(JobStatus::Pending)
    }

    async fn fetch_asset(&self, _asset_url: &str) -> std::result::Result<Vec<u8>, GenerationError> {
        Ok(WAV.to_vec())
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl AssetStorage for MemoryStorage {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
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

/// Three attempts without waiting
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
        jitter: Duration::ZERO,
    }
}

/// Orchestrator wired to fakes
pub struct TestPipeline {
    pub db: SqlitePool,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub staging: Arc<StagedTextSource>,
    pub analyzer: Arc<ScriptedAnalyzer>,
    pub synthesizer: Arc<ScriptedSynthesizer>,
    pub storage: Arc<MemoryStorage>,
}

impl TestPipeline {
    pub async fn new(analyzer: ScriptedAnalyzer) -> Self {
        Self::with_synthesizer(analyzer, ScriptedSynthesizer::default()).await
    }

    pub async fn with_synthesizer(analyzer: ScriptedAnalyzer, synthesizer: ScriptedSynthesizer) -> Self {
        let db = init_memory_database().await.unwrap();
        let analyzer = Arc::new(analyzer);
        let synthesizer = Arc::new(synthesizer);
        let storage = Arc::new(MemoryStorage::default());
        let staging = Arc::new(StagedTextSource::default());

        let timings = GeneratorTimings {
            call_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(1),
            poll_timeout: Duration::from_secs(5),
        };
        let services = PipelineServices {
            text_source: staging.clone(),
            extractor: DescriptorExtractor::new(
                analyzer.clone(),
                fast_retry(),
                Duration::from_secs(5),
                AnalysisOptions::default(),
            ),
            generator: SoundscapeGenerator::new(synthesizer.clone(), storage.clone(), fast_retry(), timings),
            storage: storage.clone(),
        };
        let settings = PipelineSettings {
            analysis_unit_cost: 0.01,
            generation_unit_cost: 0.5,
            ..PipelineSettings::default()
        };
        let orchestrator = Arc::new(PipelineOrchestrator::new(
            db.clone(),
            EventBus::new(1024),
            JobQueues::new(2, 3, 3),
            services,
            settings,
        ));

        Self {
            db,
            orchestrator,
            staging,
            analyzer,
            synthesizer,
            storage,
        }
    }

    /// Create a pending book with its pages staged
    pub async fn add_book(&self, title: &str, pages: &[&str]) -> Uuid {
        let book = books::create_book(&self.db, title).await.unwrap();
        let numbered = pages
            .iter()
            .enumerate()
            .map(|(i, text)| (i as u32 + 1, text.to_string()))
            .collect();
        self.staging.stage(book.id, StagedDocument::Pages(numbered));
        book.id
    }

    pub async fn book(&self, book_id: Uuid) -> Book {
        books::load_book(&self.db, book_id).await.unwrap()
    }

    /// App state with a running worker, for HTTP tests
    pub fn app_state(&self, backlog: usize) -> (AppState, tokio_util::sync::CancellationToken) {
        let (queue, jobs) = BookQueue::channel(backlog);
        let cancel = tokio_util::sync::CancellationToken::new();
        tokio::spawn(Arc::clone(&self.orchestrator).run_worker(jobs, cancel.clone()));
        let state = AppState::new(self.db.clone(), Arc::clone(&self.orchestrator), queue, self.staging.clone());
        (state, cancel)
    }
}

/// Page texts: `forest` pages of forest prose followed by `castle` pages
pub fn forest_then_castle(forest: usize, castle: usize) -> Vec<&'static str> {
    let mut pages = vec!["The trees whispered over the mossy path."; forest];
    pages.extend(vec!["Torches flickered along the castle walls."; castle]);
    pages
}

/// Poll until the book reaches `status` or a few seconds pass
pub async fn wait_for_status(db: &SqlitePool, book_id: Uuid, status: BookStatus) -> Book {
    for _ in 0..500 {
        let book = books::load_book(db, book_id).await.unwrap();
        if book.status == status {
            return book;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let book = books::load_book(db, book_id).await.unwrap();
    panic!("Book {} stuck in {} waiting for {}", book_id, book.status, status);
}
