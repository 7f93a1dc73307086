//! Named job queues
//!
//! Each pipeline stage has its own concurrency limit, shared by every book in
//! flight. A large book holds at most `generation` permits at a time, so
//! other books keep making progress.
//!
//! Books enter the pipeline through a bounded [`BookQueue`]; enqueueing never
//! blocks and reports a full or closed queue to the caller.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, AcquireError, OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use ambr_common::config::QueueConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    /// Pulling page text for a book
    Extraction,
    /// One content-analysis call
    Analysis,
    /// One scene's cache lookup and generation
    Generation,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Extraction => "extraction",
            QueueName::Analysis => "analysis",
            QueueName::Generation => "generation",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct Lane {
    limit: usize,
    semaphore: Arc<Semaphore>,
}

impl Lane {
    fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            semaphore: Arc::new(Semaphore::new(limit)),
        }
    }
}

/// Per-stage concurrency limits
#[derive(Debug, Clone)]
pub struct JobQueues {
    extraction: Arc<Lane>,
    analysis: Arc<Lane>,
    generation: Arc<Lane>,
}

impl JobQueues {
    pub fn new(extraction: usize, analysis: usize, generation: usize) -> Self {
        Self {
            extraction: Arc::new(Lane::new(extraction)),
            analysis: Arc::new(Lane::new(analysis)),
            generation: Arc::new(Lane::new(generation)),
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.extraction, config.analysis, config.generation)
    }

    fn lane(&self, queue: QueueName) -> &Lane {
        match queue {
            QueueName::Extraction => &self.extraction,
            QueueName::Analysis => &self.analysis,
            QueueName::Generation => &self.generation,
        }
    }

    /// Wait for a slot on `queue`; the slot is released when the permit drops
    pub async fn acquire(&self, queue: QueueName) -> Result<OwnedSemaphorePermit, AcquireError> {
        Arc::clone(&self.lane(queue).semaphore).acquire_owned().await
    }

    pub fn limit(&self, queue: QueueName) -> usize {
        self.lane(queue).limit
    }

    pub fn available(&self, queue: QueueName) -> usize {
        self.lane(queue).semaphore.available_permits()
    }

    /// Refuse further acquisitions; pending waiters get an error
    pub fn close(&self) {
        self.extraction.semaphore.close();
        self.analysis.semaphore.close();
        self.generation.semaphore.close();
    }
}

impl Default for JobQueues {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

/// A book waiting for the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookJob {
    pub book_id: Uuid,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("Pipeline backlog is full")]
    Full,

    #[error("Pipeline worker is not running")]
    Closed,
}

/// Sending side of the book backlog
#[derive(Debug, Clone)]
pub struct BookQueue {
    tx: mpsc::Sender<BookJob>,
}

impl BookQueue {
    /// Bounded backlog of `capacity` books
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<BookJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, book_id: Uuid) -> Result<(), EnqueueError> {
        self.tx.try_send(BookJob { book_id }).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })?;
        tracing::debug!(book_id = %book_id, "Book enqueued");
        Ok(())
    }
}
