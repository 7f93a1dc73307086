//! Reading progress
//!
//! GET/PUT /books/{id}/progress?user={user_id}

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use ambr_common::db::progress;
use ambr_common::models::ReadingProgress;

use super::books::find_book;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    pub user: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProgressRequest {
    pub current_page: u32,
}

/// GET /books/{id}/progress
pub async fn get_progress(
    State(state): State<AppState>,
    Path(book_id): Path<Uuid>,
    Query(query): Query<ProgressQuery>,
) -> ApiResult<Json<ReadingProgress>> {
    find_book(&state, book_id).await?;

    progress::get_progress(&state.db, &query.user, book_id)
        .await?
        .map(Json)
        .ok_or_else(|| {
            ApiError::NotFound(format!("No progress for user {} in book {}", query.user, book_id))
        })
}

/// PUT /books/{id}/progress
pub async fn put_progress(
    State(state): State<AppState>,
    Path(book_id): Path<Uuid>,
    Query(query): Query<ProgressQuery>,
    Json(request): Json<UpdateProgressRequest>,
) -> ApiResult<Json<ReadingProgress>> {
    let book = find_book(&state, book_id).await?;
    if book.total_pages > 0 && request.current_page > book.total_pages {
        return Err(ApiError::BadRequest(format!(
            "Page {} is past the end of the book ({} pages)",
            request.current_page, book.total_pages
        )));
    }

    let saved = progress::upsert_progress(&state.db, &query.user, book_id, request.current_page).await?;
    tracing::debug!(book_id = %book_id, user = %query.user, page = saved.current_page, "Progress saved");
    Ok(Json(saved))
}

pub fn progress_routes() -> Router<AppState> {
    Router::new().route("/books/:id/progress", get(get_progress).put(put_progress))
}
