//! Soundscape persistence and fingerprint lookup

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, parse_uuid};
use crate::models::{Soundscape, SoundscapeTags};
use crate::{Error, Result};

const SOUNDSCAPE_COLUMNS: &str = "id, scene_id, audio_url, asset_key, duration_seconds, source_type, \
                                  confidence, generation_job_id, prompt, source_capability, \
                                  fingerprint, tags, created_at";

/// Make `soundscape` the scene's only soundscape
///
/// Deletes whatever was assigned before and inserts the new row in one
/// transaction, and clears the scene's curation flag. Returns the replaced
/// soundscape, if any, so the caller can release its asset.
pub async fn assign_soundscape(pool: &SqlitePool, soundscape: &Soundscape) -> Result<Option<Soundscape>> {
    soundscape.validate()?;

    let scene_id = soundscape.scene_id.to_string();
    let mut tx = pool.begin().await?;

    let scene_exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM scenes WHERE id = ?")
        .bind(&scene_id)
        .fetch_optional(&mut *tx)
        .await?;
    if scene_exists.is_none() {
        return Err(Error::NotFound(format!("Scene {}", soundscape.scene_id)));
    }

    let sql = format!("SELECT {} FROM soundscapes WHERE scene_id = ?", SOUNDSCAPE_COLUMNS);
    let previous = sqlx::query(&sql)
        .bind(&scene_id)
        .fetch_optional(&mut *tx)
        .await?
        .as_ref()
        .map(soundscape_from_row)
        .transpose()?;

    sqlx::query("DELETE FROM soundscapes WHERE scene_id = ?")
        .bind(&scene_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO soundscapes (id, scene_id, audio_url, asset_key, duration_seconds,
                                 source_type, confidence, generation_job_id, prompt,
                                 source_capability, fingerprint, tags, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(soundscape.id.to_string())
    .bind(&scene_id)
    .bind(&soundscape.audio_url)
    .bind(&soundscape.asset_key)
    .bind(soundscape.duration_seconds as i64)
    .bind(soundscape.source_type.as_str())
    .bind(soundscape.confidence)
    .bind(&soundscape.generation_job_id)
    .bind(&soundscape.prompt)
    .bind(&soundscape.source_capability)
    .bind(&soundscape.fingerprint)
    .bind(serde_json::to_string(&soundscape.tags)?)
    .bind(format_timestamp(&soundscape.created_at))
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE scenes SET needs_curation = 0 WHERE id = ?")
        .bind(&scene_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(previous)
}

pub async fn get_for_scene(pool: &SqlitePool, scene_id: Uuid) -> Result<Option<Soundscape>> {
    let sql = format!("SELECT {} FROM soundscapes WHERE scene_id = ?", SOUNDSCAPE_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(scene_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(soundscape_from_row).transpose()
}

/// Most recently created soundscape with this fingerprint, from any book
pub async fn find_latest_by_fingerprint(pool: &SqlitePool, fingerprint: &str) -> Result<Option<Soundscape>> {
    let sql = format!(
        "SELECT {} FROM soundscapes WHERE fingerprint = ? ORDER BY created_at DESC, rowid DESC LIMIT 1",
        SOUNDSCAPE_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(fingerprint)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(soundscape_from_row).transpose()
}

/// Soundscapes of every scene in a book, in scene order
pub async fn load_for_book(pool: &SqlitePool, book_id: Uuid) -> Result<Vec<Soundscape>> {
    let columns = SOUNDSCAPE_COLUMNS
        .split(", ")
        .map(|c| format!("s.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {} FROM soundscapes s JOIN scenes c ON c.id = s.scene_id \
         WHERE c.book_id = ? ORDER BY c.scene_number",
        columns
    );
    let rows = sqlx::query(&sql)
        .bind(book_id.to_string())
        .fetch_all(pool)
        .await?;

    rows.iter().map(soundscape_from_row).collect()
}

/// Remove the scene's soundscape, returning it if there was one
pub async fn delete_for_scene(pool: &SqlitePool, scene_id: Uuid) -> Result<Option<Soundscape>> {
    let existing = get_for_scene(pool, scene_id).await?;
    if existing.is_some() {
        sqlx::query("DELETE FROM soundscapes WHERE scene_id = ?")
            .bind(scene_id.to_string())
            .execute(pool)
            .await?;
    }
    Ok(existing)
}

/// Number of soundscape rows pointing at a stored asset
pub async fn count_asset_references(pool: &SqlitePool, asset_key: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM soundscapes WHERE asset_key = ?")
        .bind(asset_key)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn soundscape_from_row(row: &SqliteRow) -> Result<Soundscape> {
    let id: String = row.get("id");
    let scene_id: String = row.get("scene_id");
    let source_type: String = row.get("source_type");
    let tags: String = row.get("tags");
    let created_at: String = row.get("created_at");

    Ok(Soundscape {
        id: parse_uuid(&id)?,
        scene_id: parse_uuid(&scene_id)?,
        audio_url: row.get("audio_url"),
        asset_key: row.get("asset_key"),
        duration_seconds: row.get::<i64, _>("duration_seconds") as u32,
        source_type: source_type.parse()?,
        confidence: row.get("confidence"),
        generation_job_id: row.get("generation_job_id"),
        prompt: row.get("prompt"),
        source_capability: row.get("source_capability"),
        fingerprint: row.get("fingerprint"),
        tags: SoundscapeTags::from_json(&tags)?,
        created_at: parse_timestamp(&created_at)?,
    })
}
