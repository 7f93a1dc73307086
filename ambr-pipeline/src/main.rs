//! ambr-pipeline - narrative segmentation and soundscape pipeline service
//!
//! Accepts books over HTTP, runs them through
//! EXTRACTING → ANALYZING → SEGMENTING → GENERATING on a background worker,
//! and serves the resulting playback timeline and stored assets.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ambr_common::config::{LoggingConfig, TomlConfig, CONFIG_ENV_VAR, ROOT_FOLDER_ENV_VAR};
use ambr_common::db::init_database;
use ambr_common::events::EventBus;
use ambr_pipeline::config::Settings;
use ambr_pipeline::services::{
    AssetStorage, BookQueue, DescriptorExtractor, HttpAudioSynthesizer, HttpContentAnalyzer,
    LocalAssetStorage, PipelineOrchestrator, PipelineServices, SoundscapeGenerator,
    StagedTextSource,
};
use ambr_pipeline::AppState;

const EVENT_BUS_CAPACITY: usize = 256;

/// Command-line arguments for ambr-pipeline
#[derive(Parser, Debug)]
#[command(name = "ambr-pipeline")]
#[command(about = "Narrative segmentation and soundscape pipeline")]
#[command(version)]
struct Args {
    /// Bootstrap TOML file
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Folder holding the database and local assets
    #[arg(short, long, env = ROOT_FOLDER_ENV_VAR)]
    root_folder: Option<PathBuf>,

    /// Port to listen on (overrides `[server].port`)
    #[arg(short, long, env = "AMBR_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    init_tracing(&config.logging)?;

    info!("Starting ambr-pipeline v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::resolve(config, args.root_folder.as_deref());
    settings.ensure_directories()?;
    info!("Root folder: {}", settings.root_folder.display());

    let db_path = settings.database_path();
    let db = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    info!("Database: {}", db_path.display());

    let shutdown = CancellationToken::new();
    let config = &settings.config;

    let storage: Arc<dyn AssetStorage> = Arc::new(LocalAssetStorage::new(
        settings.asset_dir(),
        config.storage.public_base_url.clone(),
    ));
    let analyzer = Arc::new(HttpContentAnalyzer::new(&config.analysis)?);
    let synthesizer = Arc::new(HttpAudioSynthesizer::new(&config.synthesis)?);
    let staging = Arc::new(StagedTextSource::new(settings.pagination_options()?));

    let services = PipelineServices {
        text_source: staging.clone(),
        extractor: DescriptorExtractor::new(
            analyzer,
            settings.retry_policy(),
            config.analysis.timeout(),
            settings.analysis_options(),
        ),
        generator: SoundscapeGenerator::new(
            synthesizer,
            Arc::clone(&storage),
            settings.retry_policy(),
            settings.generator_timings(),
        )
        .with_cancellation(shutdown.child_token()),
        storage,
    };
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        db.clone(),
        EventBus::new(EVENT_BUS_CAPACITY),
        settings.queues(),
        services,
        settings.pipeline_settings(),
    ));

    let (book_queue, jobs) = BookQueue::channel(config.queues.backlog);
    let worker = tokio::spawn(Arc::clone(&orchestrator).run_worker(jobs, shutdown.clone()));

    for book_id in orchestrator.recover_interrupted().await? {
        if let Err(e) = book_queue.enqueue(book_id) {
            warn!(book_id = %book_id, error = %e, "Could not re-enqueue pending book");
        }
    }

    let state = AppState::new(db, Arc::clone(&orchestrator), book_queue, staging);
    let mut app = ambr_pipeline::build_router(state);
    if let Some(route) = settings.asset_route() {
        info!("Serving assets from {} at {}", settings.asset_dir().display(), route);
        app = app.nest_service(&route, ServeDir::new(settings.asset_dir()));
    }
    let app = app
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let bind_address = settings.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_address))?;
    info!("Listening on http://{}", bind_address);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_shutdown.cancel();
        })
        .await
        .context("Server error")?;

    shutdown.cancel();
    orchestrator.queues().close();
    if let Err(e) = worker.await {
        warn!(error = %e, "Pipeline worker ended abnormally");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// `RUST_LOG` wins over `[logging].level`
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
