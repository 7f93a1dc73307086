//! Text source
//!
//! Extraction itself happens outside the pipeline. A [`TextSource`] hands the
//! orchestrator an ordered list of `(page_number, text)` pairs per book; a
//! document that arrives as one string is split with [`paginate_text`].

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use ambr_common::{Error, Result};

/// Page text of one book, before it is persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedDocument {
    /// Already paginated
    Pages(Vec<(u32, String)>),
    /// One document string
    Text(String),
}

#[async_trait]
pub trait TextSource: Send + Sync {
    /// Ordered pages of a book
    ///
    /// Any error is fatal for the book.
    async fn pages(&self, book_id: Uuid) -> Result<Vec<(u32, String)>>;

    /// Called once the pages are persisted
    async fn release(&self, _book_id: Uuid) {}
}

/// Splitting rules for single-string documents
#[derive(Debug, Clone)]
pub struct PaginationOptions {
    /// Characters per page (not bytes)
    pub page_chars: usize,
    /// Trimmed pages shorter than this are dropped
    pub min_page_chars: usize,
    /// Marker where the body starts; front matter before it is paginated on its own
    pub body_marker: Option<Regex>,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            page_chars: 1500,
            min_page_chars: 50,
            body_marker: None,
        }
    }
}

impl PaginationOptions {
    pub fn with_body_marker(mut self, pattern: &str) -> Result<Self> {
        let marker = Regex::new(pattern)
            .map_err(|e| Error::Validation(format!("Invalid body marker '{}': {}", pattern, e)))?;
        self.body_marker = Some(marker);
        Ok(self)
    }
}

fn chunk_chars(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Split a document into pages numbered 1..N
///
/// When `body_marker` matches, the text before the first match and the text
/// from the match onwards are chunked separately, so the marker opens a page.
pub fn paginate_text(text: &str, options: &PaginationOptions) -> Vec<(u32, String)> {
    let sections: Vec<&str> = match options.body_marker.as_ref().and_then(|m| m.find(text)) {
        Some(found) => vec![&text[..found.start()], &text[found.start()..]],
        None => vec![text],
    };

    sections
        .into_iter()
        .flat_map(|section| chunk_chars(section, options.page_chars))
        .map(|page| page.trim().to_string())
        .filter(|page| page.chars().count() >= options.min_page_chars)
        .enumerate()
        .map(|(i, page)| (i as u32 + 1, page))
        .collect()
}

/// Holds uploaded documents until the orchestrator extracts them
///
/// Documents live in memory only. Once extraction has persisted a book's
/// pages they are no longer needed; a book still pending when the process
/// stops has to be uploaded again.
pub struct StagedTextSource {
    documents: Mutex<HashMap<Uuid, StagedDocument>>,
    options: PaginationOptions,
}

impl StagedTextSource {
    pub fn new(options: PaginationOptions) -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            options,
        }
    }

    pub fn options(&self) -> &PaginationOptions {
        &self.options
    }

    pub fn stage(&self, book_id: Uuid, document: StagedDocument) {
        self.documents().insert(book_id, document);
    }

    pub fn is_staged(&self, book_id: Uuid) -> bool {
        self.documents().contains_key(&book_id)
    }

    /// The map stays usable after a panic elsewhere while it was held
    fn documents(&self) -> MutexGuard<'_, HashMap<Uuid, StagedDocument>> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for StagedTextSource {
    fn default() -> Self {
        Self::new(PaginationOptions::default())
    }
}

#[async_trait]
impl TextSource for StagedTextSource {
    async fn pages(&self, book_id: Uuid) -> Result<Vec<(u32, String)>> {
        let document = self
            .documents()
            .get(&book_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("No text staged for book {}", book_id)))?;

        let mut pages = match document {
            StagedDocument::Pages(pages) => pages,
            StagedDocument::Text(text) => paginate_text(&text, &self.options),
        };
        pages.sort_by_key(|(number, _)| *number);
        Ok(pages)
    }

    async fn release(&self, book_id: Uuid) {
        self.documents().remove(&book_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(page_chars: usize, min_page_chars: usize) -> PaginationOptions {
        PaginationOptions {
            page_chars,
            min_page_chars,
            body_marker: None,
        }
    }

    #[test]
    fn test_fixed_size_pages() {
        let text = "a".repeat(3500);
        let pages = paginate_text(&text, &PaginationOptions::default());

        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].0, 1);
        assert_eq!(pages[0].1.len(), 1500);
        assert_eq!(pages[2].1.len(), 500);
    }

    #[test]
    fn test_short_pages_dropped_and_renumbered() {
        // Second chunk is whitespace only, third is too short
        let text = format!("{}{}{}", "x".repeat(10), " ".repeat(10), "y".repeat(4));
        let pages = paginate_text(&text, &options(10, 5));

        assert_eq!(pages, vec![(1, "x".repeat(10))]);
    }

    #[test]
    fn test_splits_on_characters_not_bytes() {
        let text = "é".repeat(20);
        let pages = paginate_text(&text, &options(10, 1));

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].1.chars().count(), 10);
    }

    #[test]
    fn test_body_marker_opens_a_page() {
        let front = "Title page and contents. ".repeat(3);
        let body = format!("CHAPTER I. {}", "Down the rabbit hole. ".repeat(4));
        let text = format!("{}{}", front, body);
        let opts = options(1500, 10).with_body_marker(r"CHAPTER I\b").unwrap();

        let pages = paginate_text(&text, &opts);

        assert_eq!(pages.len(), 2);
        assert!(pages[1].1.starts_with("CHAPTER I."));
        assert!(!pages[0].1.contains("CHAPTER"));
    }

    #[test]
    fn test_invalid_marker_rejected() {
        assert!(PaginationOptions::default().with_body_marker("(").is_err());
    }

    #[tokio::test]
    async fn test_staged_source() {
        let source = StagedTextSource::new(options(10, 1));
        let book_id = Uuid::new_v4();

        assert!(matches!(source.pages(book_id).await, Err(Error::NotFound(_))));

        source.stage(
            book_id,
            StagedDocument::Pages(vec![(2, "two".into()), (1, "one".into())]),
        );
        assert!(source.is_staged(book_id));
        let pages = source.pages(book_id).await.unwrap();
        assert_eq!(pages[0], (1, "one".to_string()));

        source.release(book_id).await;
        assert!(!source.is_staged(book_id));
    }

    #[test]
    fn test_staging_survives_poisoned_lock() {
        let source = StagedTextSource::default();
        let poisoned = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = source.documents.lock().unwrap();
            panic!("writer died");
        }));
        assert!(poisoned.is_err());
        assert!(source.documents.is_poisoned());

        let book_id = Uuid::new_v4();
        source.stage(book_id, StagedDocument::Text("Once upon a time".into()));
        assert!(source.is_staged(book_id));
    }
}
