//! Page persistence

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{format_timestamp, parse_optional_uuid, parse_uuid};
use crate::models::Page;
use crate::{Error, Result};

/// Store extracted pages and update `books.total_pages`, in one transaction
///
/// Page numbers must be unique and at least 1. Existing pages of the book
/// are left untouched; inserting a page number twice is a database error.
pub async fn insert_pages(pool: &SqlitePool, book_id: Uuid, pages: &[(u32, String)]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for (number, _) in pages {
        if *number == 0 {
            return Err(Error::Validation("Page numbers are 1-based".to_string()));
        }
        if !seen.insert(*number) {
            return Err(Error::Validation(format!("Duplicate page number {}", number)));
        }
    }

    let book_id_str = book_id.to_string();
    let mut tx = pool.begin().await?;

    for (number, text) in pages {
        sqlx::query("INSERT INTO pages (book_id, page_number, text_content) VALUES (?, ?, ?)")
            .bind(&book_id_str)
            .bind(*number as i64)
            .bind(text)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query(
        r#"
        UPDATE books
        SET total_pages = (SELECT COUNT(*) FROM pages WHERE book_id = ?), updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&book_id_str)
    .bind(format_timestamp(&chrono::Utc::now()))
    .bind(&book_id_str)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Pages of a book in page order
pub async fn load_pages(pool: &SqlitePool, book_id: Uuid) -> Result<Vec<Page>> {
    let rows = sqlx::query(
        r#"
        SELECT book_id, page_number, text_content, scene_id
        FROM pages
        WHERE book_id = ?
        ORDER BY page_number
        "#,
    )
    .bind(book_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let book_id: String = row.get("book_id");
            Ok(Page {
                book_id: parse_uuid(&book_id)?,
                page_number: row.get::<i64, _>("page_number") as u32,
                text_content: row.get("text_content"),
                scene_id: parse_optional_uuid(row.get("scene_id"))?,
            })
        })
        .collect()
}

pub async fn count_pages(pool: &SqlitePool, book_id: Uuid) -> Result<u32> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pages WHERE book_id = ?")
        .bind(book_id.to_string())
        .fetch_one(pool)
        .await?;
    Ok(count as u32)
}
