//! Reading progress persistence

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp};
use crate::models::ReadingProgress;
use crate::{Error, Result};

/// Record the page a user has open; one row per (user, book)
pub async fn upsert_progress(
    pool: &SqlitePool,
    user_id: &str,
    book_id: Uuid,
    current_page: u32,
) -> Result<ReadingProgress> {
    if user_id.trim().is_empty() {
        return Err(Error::Validation("User id is empty".to_string()));
    }
    if current_page == 0 {
        return Err(Error::Validation("Pages are 1-based".to_string()));
    }

    let updated_at = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO reading_progress (user_id, book_id, current_page, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(user_id, book_id) DO UPDATE SET
            current_page = excluded.current_page,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id)
    .bind(book_id.to_string())
    .bind(current_page as i64)
    .bind(format_timestamp(&updated_at))
    .execute(pool)
    .await?;

    Ok(ReadingProgress {
        user_id: user_id.to_string(),
        book_id,
        current_page,
        updated_at,
    })
}

pub async fn get_progress(pool: &SqlitePool, user_id: &str, book_id: Uuid) -> Result<Option<ReadingProgress>> {
    let row = sqlx::query(
        "SELECT current_page, updated_at FROM reading_progress WHERE user_id = ? AND book_id = ?",
    )
    .bind(user_id)
    .bind(book_id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let updated_at: String = row.get("updated_at");
            Ok(Some(ReadingProgress {
                user_id: user_id.to_string(),
                book_id,
                current_page: row.get::<i64, _>("current_page") as u32,
                updated_at: parse_timestamp(&updated_at)?,
            }))
        }
        None => Ok(None),
    }
}
