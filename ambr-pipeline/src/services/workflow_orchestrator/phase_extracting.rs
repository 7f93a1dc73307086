//! EXTRACTING
//!
//! Pages persisted by an earlier run are reused; otherwise the text source is
//! asked for them. Any failure here is fatal for the book.

use anyhow::{bail, Context, Result};
use uuid::Uuid;

use ambr_common::db::pages;
use ambr_common::models::{BookStatus, Page};

use super::PipelineOrchestrator;
use crate::services::job_queue::QueueName;

/// Pages must be numbered 1..N without gaps
fn check_contiguous(pages: &[Page]) -> Result<()> {
    if pages.is_empty() {
        bail!("Text source produced no pages");
    }
    for (i, page) in pages.iter().enumerate() {
        let expected = i as u32 + 1;
        if page.page_number != expected {
            bail!(
                "Page numbers are not contiguous: expected page {}, found page {}",
                expected,
                page.page_number
            );
        }
    }
    Ok(())
}

impl PipelineOrchestrator {
    pub(super) async fn phase_extracting(&self, book_id: Uuid) -> Result<Vec<Page>> {
        let _permit = self.queues.acquire(QueueName::Extraction).await?;

        tracing::info!(book_id = %book_id, "Phase: EXTRACTING");

        let mut book_pages = pages::load_pages(&self.db, book_id).await?;
        if book_pages.is_empty() {
            let extracted = self
                .text_source
                .pages(book_id)
                .await
                .context("Text extraction failed")?;

            pages::insert_pages(&self.db, book_id, &extracted)
                .await
                .context("Failed to store extracted pages")?;
            self.text_source.release(book_id).await;

            book_pages = pages::load_pages(&self.db, book_id).await?;
            tracing::debug!(book_id = %book_id, pages = book_pages.len(), "Stored extracted pages");
        } else {
            tracing::debug!(book_id = %book_id, pages = book_pages.len(), "Reusing stored pages");
        }

        check_contiguous(&book_pages)?;

        self.transition(book_id, BookStatus::Extracting, BookStatus::Analyzing)
            .await?;

        Ok(book_pages)
    }
}
