//! Pipeline services
//!
//! Leaf-first: content analysis and descriptor extraction, scene
//! segmentation, the soundscape cache, audio synthesis and generation, asset
//! storage, text sources, job queues and the orchestrator that sequences
//! them per book.

pub mod asset_storage;
pub mod audio_synthesizer;
pub mod content_analyzer;
pub mod descriptor_extractor;
pub mod job_queue;
pub mod scene_segmenter;
pub mod soundscape_cache;
pub mod soundscape_generator;
pub mod text_source;
pub mod timeline;
pub mod workflow_orchestrator;

pub use asset_storage::{asset_key, detect_extension, AssetStorage, LocalAssetStorage};
pub use audio_synthesizer::{AudioSynthesizer, HttpAudioSynthesizer, JobStatus, SynthesisHandle};
pub use content_analyzer::{AnalysisOptions, ContentAnalyzer, HttpContentAnalyzer};
pub use descriptor_extractor::{resolve_descriptor, DescriptorExtractor};
pub use job_queue::{BookJob, BookQueue, EnqueueError, JobQueues, QueueName};
pub use scene_segmenter::{build_spreads, is_boundary, segment, Spread};
pub use soundscape_cache::{fingerprint, AssetReference, SoundscapeCache};
pub use soundscape_generator::{CompletedJob, GenerationHandle, GeneratorTimings, SoundscapeGenerator};
pub use text_source::{paginate_text, PaginationOptions, StagedDocument, StagedTextSource, TextSource};
pub use timeline::{build_timeline, load_timeline};
pub use workflow_orchestrator::{PipelineOrchestrator, PipelineServices, PipelineSettings, RunSummary};
