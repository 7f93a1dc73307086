//! Scheduler task
//!
//! Runs a [`PlaybackScheduler`] on one tokio task. Navigation commands, load
//! completions and ramp ticks are all handled inside a single `select!`
//! loop, so two transitions can never race on the output. Fetch, decode and
//! conversion to the output's rate run as separate tasks and report back
//! into the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use ambr_common::models::TimelineEntry;

use crate::audio::{decode_bytes, extension_hint, resample, AssetLoader, AudioOutput, DecodedAudio};
use crate::clock::Clock;
use crate::error::{PlayerError, Result};
use crate::playback::{PlaybackScheduler, PreloadRequest};
use crate::state::PlayerState;

/// Interval between ramp updates
pub const TICK_INTERVAL: Duration = Duration::from_millis(20);

const COMMAND_CAPACITY: usize = 64;

enum Command {
    Open(Vec<TimelineEntry>),
    Navigate(u32),
    Pause(oneshot::Sender<Result<()>>),
    Resume(oneshot::Sender<Result<()>>),
    SetVolume(f32),
    State(oneshot::Sender<PlayerState>),
}

type LoadResult = (PreloadRequest, Result<Arc<DecodedAudio>>);

/// Handle to a running scheduler task
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn spawn<O, C, L>(scheduler: PlaybackScheduler<O, C>, loader: Arc<L>) -> Self
    where
        O: AudioOutput + 'static,
        C: Clock + 'static,
        L: AssetLoader + 'static,
    {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let task = tokio::spawn(run(scheduler, loader, rx));
        Self { commands: tx, task }
    }

    pub async fn open(&self, timeline: Vec<TimelineEntry>) -> Result<()> {
        self.send(Command::Open(timeline)).await
    }

    pub async fn navigate(&self, page: u32) -> Result<()> {
        self.send(Command::Navigate(page)).await
    }

    pub async fn pause(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Pause(tx)).await?;
        rx.await.map_err(|_| stopped())?
    }

    pub async fn resume(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Resume(tx)).await?;
        rx.await.map_err(|_| stopped())?
    }

    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        self.send(Command::SetVolume(volume)).await
    }

    pub async fn state(&self) -> Result<PlayerState> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::State(tx)).await?;
        rx.await.map_err(|_| stopped())
    }

    /// Stop the task once queued commands are handled
    pub async fn shutdown(self) {
        drop(self.commands);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Scheduler task ended abnormally");
        }
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).await.map_err(|_| stopped())
    }
}

fn stopped() -> PlayerError {
    PlayerError::InvalidState("Scheduler task has stopped".into())
}

async fn run<O, C, L>(mut scheduler: PlaybackScheduler<O, C>, loader: Arc<L>, mut commands: mpsc::Receiver<Command>)
where
    O: AudioOutput,
    C: Clock,
    L: AssetLoader + 'static,
{
    let output_rate = scheduler.output().output_rate();
    let mut loads: JoinSet<LoadResult> = JoinSet::new();
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                handle_command(&mut scheduler, command);
            }
            Some(joined) = loads.join_next(), if !loads.is_empty() => match joined {
                Ok((request, result)) => scheduler.on_load_finished(&request, result),
                Err(e) => tracing::warn!(error = %e, "Asset load task failed"),
            },
            _ = ticker.tick() => scheduler.tick(),
        }

        for request in scheduler.preload_requests() {
            loads.spawn(load(Arc::clone(&loader), request, output_rate));
        }
    }

    loads.abort_all();
    tracing::debug!("Scheduler task stopped");
}

fn handle_command<O: AudioOutput, C: Clock>(scheduler: &mut PlaybackScheduler<O, C>, command: Command) {
    match command {
        Command::Open(timeline) => scheduler.open(timeline),
        Command::Navigate(page) => scheduler.navigate(page),
        Command::Pause(reply) => {
            let _ = reply.send(scheduler.pause());
        }
        Command::Resume(reply) => {
            let _ = reply.send(scheduler.resume());
        }
        Command::SetVolume(volume) => scheduler.set_volume(volume),
        Command::State(reply) => {
            let _ = reply.send(scheduler.state());
        }
    }
}

async fn load<L: AssetLoader>(loader: Arc<L>, request: PreloadRequest, output_rate: Option<u32>) -> LoadResult {
    let result = async {
        let bytes = loader.load(&request.audio_url).await?;
        let extension = extension_hint(&request.audio_url).map(str::to_string);
        let audio = tokio::task::spawn_blocking(move || {
            let decoded = decode_bytes(&bytes, extension.as_deref())?;
            match output_rate {
                Some(rate) => resample(decoded, rate),
                None => Ok(decoded),
            }
        })
        .await
        .map_err(|e| PlayerError::Decode(format!("Decode task failed: {}", e)))??;
        Ok::<_, PlayerError>(Arc::new(audio))
    }
    .await;
    (request, result)
}
