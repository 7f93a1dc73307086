//! Book persistence
//!
//! Status changes go through [`transition_status`], a single conditional
//! UPDATE, so readers see either the old or the new status and a stale
//! writer cannot overwrite a status it did not observe.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, parse_uuid};
use crate::models::{Book, BookStatus};
use crate::{Error, Result};

/// Insert a new book
pub async fn insert_book(pool: &SqlitePool, book: &Book) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO books (id, title, total_pages, status, processing_error,
                           processing_cost, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(book.id.to_string())
    .bind(&book.title)
    .bind(book.total_pages as i64)
    .bind(book.status.as_str())
    .bind(&book.processing_error)
    .bind(book.processing_cost)
    .bind(format_timestamp(&book.created_at))
    .bind(format_timestamp(&book.updated_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// Create and insert a pending book
pub async fn create_book(pool: &SqlitePool, title: &str) -> Result<Book> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::Validation("Book title is empty".to_string()));
    }

    let now = Utc::now();
    let book = Book {
        id: Uuid::new_v4(),
        title: title.to_string(),
        total_pages: 0,
        status: BookStatus::Pending,
        processing_error: None,
        processing_cost: 0.0,
        created_at: now,
        updated_at: now,
    };
    insert_book(pool, &book).await?;
    Ok(book)
}

pub async fn get_book(pool: &SqlitePool, book_id: Uuid) -> Result<Option<Book>> {
    let row = sqlx::query(
        r#"
        SELECT id, title, total_pages, status, processing_error,
               processing_cost, created_at, updated_at
        FROM books
        WHERE id = ?
        "#,
    )
    .bind(book_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(book_from_row).transpose()
}

/// Like [`get_book`], but a missing book is `NotFound`
pub async fn load_book(pool: &SqlitePool, book_id: Uuid) -> Result<Book> {
    get_book(pool, book_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Book {}", book_id)))
}

pub async fn list_books(pool: &SqlitePool) -> Result<Vec<Book>> {
    let rows = sqlx::query(
        r#"
        SELECT id, title, total_pages, status, processing_error,
               processing_cost, created_at, updated_at
        FROM books
        ORDER BY created_at
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(book_from_row).collect()
}

/// Compare-and-set status change
///
/// Returns `Ok(true)` when the row moved from `from` to `to`, `Ok(false)`
/// when the current status was no longer `from`. Illegal transitions are a
/// `Validation` error and touch nothing. `error` is stored as
/// `processing_error`; moving anywhere but `failed` clears it.
pub async fn transition_status(
    pool: &SqlitePool,
    book_id: Uuid,
    from: BookStatus,
    to: BookStatus,
    error: Option<&str>,
) -> Result<bool> {
    if !from.can_transition_to(to) {
        return Err(Error::Validation(format!(
            "Illegal book status transition {} -> {}",
            from, to
        )));
    }

    let processing_error = if to == BookStatus::Failed { error } else { None };

    let result = sqlx::query(
        r#"
        UPDATE books
        SET status = ?, processing_error = ?, updated_at = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(to.as_str())
    .bind(processing_error)
    .bind(format_timestamp(&Utc::now()))
    .bind(book_id.to_string())
    .bind(from.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn set_total_pages(pool: &SqlitePool, book_id: Uuid, total_pages: u32) -> Result<()> {
    sqlx::query("UPDATE books SET total_pages = ?, updated_at = ? WHERE id = ?")
        .bind(total_pages as i64)
        .bind(format_timestamp(&Utc::now()))
        .bind(book_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Add upstream spend to the book's running total
pub async fn add_processing_cost(pool: &SqlitePool, book_id: Uuid, cost: f64) -> Result<()> {
    if cost <= 0.0 {
        return Ok(());
    }

    sqlx::query("UPDATE books SET processing_cost = processing_cost + ? WHERE id = ?")
        .bind(cost)
        .bind(book_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a book; pages, scenes and soundscapes cascade
pub async fn delete_book(pool: &SqlitePool, book_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM books WHERE id = ?")
        .bind(book_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

fn book_from_row(row: &SqliteRow) -> Result<Book> {
    let id: String = row.get("id");
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Book {
        id: parse_uuid(&id)?,
        title: row.get("title"),
        total_pages: row.get::<i64, _>("total_pages") as u32,
        status: status.parse()?,
        processing_error: row.get("processing_error"),
        processing_cost: row.get("processing_cost"),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_database;

    #[tokio::test]
    async fn test_create_and_load() {
        let pool = init_memory_database().await.unwrap();
        let book = create_book(&pool, "  Alice  ").await.unwrap();

        let loaded = load_book(&pool, book.id).await.unwrap();
        assert_eq!(loaded.title, "Alice");
        assert_eq!(loaded.status, BookStatus::Pending);
        assert_eq!(loaded.processing_cost, 0.0);
    }

    #[tokio::test]
    async fn test_missing_book_is_not_found() {
        let pool = init_memory_database().await.unwrap();
        let err = load_book(&pool, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_set() {
        let pool = init_memory_database().await.unwrap();
        let book = create_book(&pool, "Alice").await.unwrap();

        assert!(transition_status(&pool, book.id, BookStatus::Pending, BookStatus::Extracting, None)
            .await
            .unwrap());
        // Stale writer still believes the book is pending
        assert!(!transition_status(&pool, book.id, BookStatus::Pending, BookStatus::Extracting, None)
            .await
            .unwrap());

        assert_eq!(load_book(&pool, book.id).await.unwrap().status, BookStatus::Extracting);
    }

    #[tokio::test]
    async fn test_illegal_transition_rejected() {
        let pool = init_memory_database().await.unwrap();
        let book = create_book(&pool, "Alice").await.unwrap();

        let err = transition_status(&pool, book.id, BookStatus::Pending, BookStatus::Published, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(load_book(&pool, book.id).await.unwrap().status, BookStatus::Pending);
    }

    #[tokio::test]
    async fn test_failure_records_error_and_reset_clears_it() {
        let pool = init_memory_database().await.unwrap();
        let book = create_book(&pool, "Alice").await.unwrap();

        transition_status(&pool, book.id, BookStatus::Pending, BookStatus::Failed, Some("unreadable"))
            .await
            .unwrap();
        let failed = load_book(&pool, book.id).await.unwrap();
        assert_eq!(failed.processing_error.as_deref(), Some("unreadable"));

        transition_status(&pool, book.id, BookStatus::Failed, BookStatus::Pending, None)
            .await
            .unwrap();
        assert_eq!(load_book(&pool, book.id).await.unwrap().processing_error, None);
    }

    #[tokio::test]
    async fn test_processing_cost_accumulates() {
        let pool = init_memory_database().await.unwrap();
        let book = create_book(&pool, "Alice").await.unwrap();

        add_processing_cost(&pool, book.id, 0.25).await.unwrap();
        add_processing_cost(&pool, book.id, 0.5).await.unwrap();

        let cost = load_book(&pool, book.id).await.unwrap().processing_cost;
        assert!((cost - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_title_rejected() {
        let pool = init_memory_database().await.unwrap();
        assert!(matches!(create_book(&pool, "   ").await, Err(Error::Validation(_))));
    }
}
