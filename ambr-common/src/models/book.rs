//! Book processing state machine and page records
//!
//! A book progresses through:
//! PENDING → EXTRACTING → ANALYZING → SEGMENTING → GENERATING → READY_FOR_REVIEW → PUBLISHED
//!
//! FAILED is reachable from any non-terminal state. A book that is ready for
//! review, published or failed may be sent back to PENDING for reprocessing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Book processing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookStatus {
    /// Uploaded, waiting for the pipeline
    Pending,
    /// Page text is being pulled from the text source
    Extracting,
    /// Per-spread descriptors are being extracted
    Analyzing,
    /// Scene boundaries are being computed
    Segmenting,
    /// Soundscapes are being looked up or generated
    Generating,
    /// Every scene was attempted; awaiting admin review
    ReadyForReview,
    /// Visible to readers
    Published,
    /// Book-level fatal error
    Failed,
}

impl BookStatus {
    /// All statuses in pipeline order
    pub const ALL: [BookStatus; 8] = [
        BookStatus::Pending,
        BookStatus::Extracting,
        BookStatus::Analyzing,
        BookStatus::Segmenting,
        BookStatus::Generating,
        BookStatus::ReadyForReview,
        BookStatus::Published,
        BookStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Pending => "pending",
            BookStatus::Extracting => "extracting",
            BookStatus::Analyzing => "analyzing",
            BookStatus::Segmenting => "segmenting",
            BookStatus::Generating => "generating",
            BookStatus::ReadyForReview => "ready_for_review",
            BookStatus::Published => "published",
            BookStatus::Failed => "failed",
        }
    }

    /// Published and failed books are not moved by the pipeline on its own
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookStatus::Published | BookStatus::Failed)
    }

    /// True while the orchestrator owns the book
    pub fn is_processing(&self) -> bool {
        matches!(
            self,
            BookStatus::Extracting
                | BookStatus::Analyzing
                | BookStatus::Segmenting
                | BookStatus::Generating
        )
    }

    /// Check whether `self → next` is a legal transition
    pub fn can_transition_to(&self, next: BookStatus) -> bool {
        use BookStatus::*;

        match (*self, next) {
            (Pending, Extracting)
            | (Extracting, Analyzing)
            | (Analyzing, Segmenting)
            | (Segmenting, Generating)
            | (Generating, ReadyForReview)
            | (ReadyForReview, Published) => true,
            (ReadyForReview | Published | Failed, Pending) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BookStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("Unknown book status '{}'", s)))
    }
}

/// Book record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub total_pages: u32,
    pub status: BookStatus,
    /// Human-readable reason for FAILED
    pub processing_error: Option<String>,
    /// Accumulated upstream spend in capability cost units
    pub processing_cost: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Page of extracted text, 1-based and unique per book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub book_id: Uuid,
    pub page_number: u32,
    pub text_content: String,
    pub scene_id: Option<Uuid>,
}

/// Last page a user had open in a book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingProgress {
    pub user_id: String,
    pub book_id: Uuid,
    pub current_page: u32,
    pub updated_at: DateTime<Utc>,
}
