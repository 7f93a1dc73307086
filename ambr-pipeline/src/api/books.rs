//! Book API handlers
//!
//! POST /books, GET /books, GET/DELETE /books/{id},
//! POST /books/{id}/reprocess, POST /books/{id}/publish,
//! GET /books/{id}/timeline
//!
//! Handlers never run the pipeline themselves. Accepted books are handed to
//! the worker through the [`BookQueue`](crate::services::BookQueue); a book
//! that cannot be queued is failed and reported as 503.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ambr_common::db::{books, failures, scenes, soundscapes, FailureRecord};
use ambr_common::models::{Book, BookStatus, Scene, Soundscape, TimelineEntry};

use crate::error::{ApiError, ApiResult};
use crate::services::{load_timeline, StagedDocument, TextSource};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PageInput {
    pub page_number: u32,
    pub text_content: String,
}

/// POST /books request
///
/// Exactly one of `pages` (already paginated) or `text` (one document) is
/// required.
#[derive(Debug, Deserialize)]
pub struct CreateBookRequest {
    pub title: String,
    #[serde(default)]
    pub pages: Option<Vec<PageInput>>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Response for requests that hand a book to the worker
#[derive(Debug, Serialize)]
pub struct QueuedBookResponse {
    pub book_id: Uuid,
    pub status: BookStatus,
}

/// GET /books/{id} response
#[derive(Debug, Serialize)]
pub struct BookDetailResponse {
    pub book: Book,
    pub scenes: Vec<Scene>,
    pub soundscapes: Vec<Soundscape>,
    /// Absorbed per-spread and per-scene failures of the latest run
    pub failures: Vec<FailureRecord>,
}

/// POST /books
///
/// Returns 202 Accepted; progress is reported over `/events`.
pub async fn create_book(
    State(state): State<AppState>,
    Json(request): Json<CreateBookRequest>,
) -> ApiResult<(StatusCode, Json<QueuedBookResponse>)> {
    let title = request.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("Title is empty".to_string()));
    }

    let document = match (request.pages, request.text) {
        (Some(pages), None) if !pages.is_empty() => StagedDocument::Pages(
            pages
                .into_iter()
                .map(|p| (p.page_number, p.text_content))
                .collect(),
        ),
        (None, Some(text)) if !text.trim().is_empty() => StagedDocument::Text(text),
        (Some(_), Some(_)) => {
            return Err(ApiError::BadRequest(
                "Provide either pages or text, not both".to_string(),
            ))
        }
        _ => return Err(ApiError::BadRequest("Book has no text".to_string())),
    };

    let book = books::create_book(&state.db, title).await?;
    state.staging.stage(book.id, document);
    enqueue_or_fail(&state, book.id).await?;

    tracing::info!(book_id = %book.id, title = %book.title, "Book accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(QueuedBookResponse {
            book_id: book.id,
            status: BookStatus::Pending,
        }),
    ))
}

/// GET /books
pub async fn list_books(State(state): State<AppState>) -> ApiResult<Json<Vec<Book>>> {
    Ok(Json(books::list_books(&state.db).await?))
}

/// GET /books/{id}
pub async fn get_book(
    State(state): State<AppState>,
    Path(book_id): Path<Uuid>,
) -> ApiResult<Json<BookDetailResponse>> {
    let book = find_book(&state, book_id).await?;

    Ok(Json(BookDetailResponse {
        scenes: scenes::load_scenes(&state.db, book_id).await?,
        soundscapes: soundscapes::load_for_book(&state.db, book_id).await?,
        failures: failures::list_failures(&state.db, book_id).await?,
        book,
    }))
}

/// DELETE /books/{id}
///
/// 409 while the pipeline is working on the book.
pub async fn delete_book(
    State(state): State<AppState>,
    Path(book_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    match state.orchestrator.delete_book(book_id).await {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(ApiError::NotFound(format!("Book not found: {}", book_id))),
        Err(ambr_common::Error::Validation(msg)) => Err(ApiError::Conflict(msg)),
        Err(e) => Err(e.into()),
    }
}

/// POST /books/{id}/reprocess
///
/// Sends a failed, reviewed or published book back through the pipeline.
pub async fn reprocess_book(
    State(state): State<AppState>,
    Path(book_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<QueuedBookResponse>)> {
    let book = find_book(&state, book_id).await?;

    if !state.orchestrator.reset_for_reprocess(book_id).await? {
        return Err(ApiError::Conflict(format!(
            "Book {} is {} and cannot be reprocessed",
            book_id, book.status
        )));
    }
    enqueue_or_fail(&state, book_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(QueuedBookResponse {
            book_id,
            status: BookStatus::Pending,
        }),
    ))
}

/// POST /books/{id}/publish
pub async fn publish_book(
    State(state): State<AppState>,
    Path(book_id): Path<Uuid>,
) -> ApiResult<Json<Book>> {
    match state.orchestrator.publish(book_id).await {
        Ok(book) => Ok(Json(book)),
        Err(ambr_common::Error::Validation(msg)) => Err(ApiError::Conflict(msg)),
        Err(e) => Err(e.into()),
    }
}

/// GET /books/{id}/timeline
///
/// Scenes in order with their soundscape, or `asset: null` for scenes read
/// without audio.
pub async fn get_timeline(
    State(state): State<AppState>,
    Path(book_id): Path<Uuid>,
) -> ApiResult<Json<Vec<TimelineEntry>>> {
    find_book(&state, book_id).await?;
    Ok(Json(load_timeline(&state.db, book_id).await?))
}

pub(crate) async fn find_book(state: &AppState, book_id: Uuid) -> ApiResult<Book> {
    books::get_book(&state.db, book_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Book not found: {}", book_id)))
}

/// Hand a pending book to the worker, failing it when that is impossible
async fn enqueue_or_fail(state: &AppState, book_id: Uuid) -> ApiResult<()> {
    let Err(e) = state.book_queue.enqueue(book_id) else {
        return Ok(());
    };

    let reason = format!("Could not enqueue book: {}", e);
    tracing::error!(book_id = %book_id, error = %e, "Enqueue failed");

    state.orchestrator.fail_pending(book_id, &reason).await?;
    state.staging.release(book_id).await;
    state.record_error(reason.clone()).await;

    Err(ApiError::Unavailable(reason))
}

pub fn book_routes() -> Router<AppState> {
    Router::new()
        .route("/books", post(create_book).get(list_books))
        .route("/books/:id", get(get_book).delete(delete_book))
        .route("/books/:id/reprocess", post(reprocess_book))
        .route("/books/:id/publish", post(publish_book))
        .route("/books/:id/timeline", get(get_timeline))
}
