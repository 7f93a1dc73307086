//! Curated soundscape overrides
//!
//! PUT /scenes/{id}/soundscape takes the raw audio bytes as the body.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    routing::put,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use ambr_common::models::{clamp_duration, Soundscape, DEFAULT_DURATION_SECONDS};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Largest accepted upload
pub const MAX_ASSET_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct OverrideQuery {
    pub duration_seconds: Option<u32>,
}

/// PUT /scenes/{id}/soundscape
pub async fn override_soundscape(
    State(state): State<AppState>,
    Path(scene_id): Path<Uuid>,
    Query(query): Query<OverrideQuery>,
    body: Bytes,
) -> ApiResult<Json<Soundscape>> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("Request body is empty".to_string()));
    }
    let duration = clamp_duration(query.duration_seconds.unwrap_or(DEFAULT_DURATION_SECONDS));

    let soundscape = state
        .orchestrator
        .override_soundscape(scene_id, &body, duration)
        .await?;
    Ok(Json(soundscape))
}

/// DELETE /scenes/{id}/soundscape
///
/// The scene is flagged for curation and read without audio until a new
/// soundscape is assigned.
pub async fn remove_soundscape(
    State(state): State<AppState>,
    Path(scene_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    match state.orchestrator.remove_soundscape(scene_id).await? {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(ApiError::NotFound(format!(
            "Scene {} has no soundscape",
            scene_id
        ))),
    }
}

pub fn scene_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/scenes/:id/soundscape",
            put(override_soundscape).delete(remove_soundscape),
        )
        .layer(DefaultBodyLimit::max(MAX_ASSET_BYTES))
}
