//! Database initialization
//!
//! Creates the SQLite database on first run and applies the schema. Schema
//! creation is idempotent; every statement uses `IF NOT EXISTS`.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Open (or create) the database file and apply the schema
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pragmas set on the connect options apply to every pooled connection
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    Ok(pool)
}

/// In-memory database with the full schema
///
/// Limited to one connection; every pooled connection to `sqlite::memory:`
/// would otherwise see its own empty database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// Create every table and index
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_books_table(pool).await?;
    create_scenes_table(pool).await?;
    create_pages_table(pool).await?;
    create_soundscapes_table(pool).await?;
    create_reading_progress_table(pool).await?;
    create_generation_failures_table(pool).await?;
    Ok(())
}

async fn create_books_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS books (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            total_pages INTEGER NOT NULL DEFAULT 0 CHECK (total_pages >= 0),
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN (
                'pending', 'extracting', 'analyzing', 'segmenting',
                'generating', 'ready_for_review', 'published', 'failed'
            )),
            processing_error TEXT,
            processing_cost REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_books_status ON books(status)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_scenes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scenes (
            id TEXT PRIMARY KEY,
            book_id TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
            scene_number INTEGER NOT NULL CHECK (scene_number >= 1),
            start_page INTEGER NOT NULL CHECK (start_page >= 1),
            end_page INTEGER NOT NULL,
            page_spread_index INTEGER NOT NULL CHECK (page_spread_index >= 0),
            descriptors TEXT NOT NULL DEFAULT '{}',
            audio_prompt TEXT NOT NULL DEFAULT '',
            needs_curation INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            CHECK (start_page <= end_page),
            UNIQUE (book_id, scene_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_scenes_book ON scenes(book_id, start_page)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_pages_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pages (
            book_id TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
            page_number INTEGER NOT NULL CHECK (page_number >= 1),
            text_content TEXT NOT NULL,
            scene_id TEXT REFERENCES scenes(id) ON DELETE SET NULL,
            PRIMARY KEY (book_id, page_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pages_scene ON pages(scene_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_soundscapes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS soundscapes (
            id TEXT PRIMARY KEY,
            scene_id TEXT NOT NULL REFERENCES scenes(id) ON DELETE CASCADE,
            audio_url TEXT NOT NULL,
            asset_key TEXT NOT NULL,
            duration_seconds INTEGER NOT NULL DEFAULT 30
                CHECK (duration_seconds BETWEEN 30 AND 60),
            source_type TEXT NOT NULL CHECK (source_type IN ('curated', 'generated')),
            confidence REAL CHECK (confidence IS NULL OR (confidence >= 0 AND confidence <= 1)),
            generation_job_id TEXT,
            prompt TEXT,
            source_capability TEXT,
            fingerprint TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One active soundscape per scene
    sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_soundscapes_scene ON soundscapes(scene_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_soundscapes_fingerprint ON soundscapes(fingerprint, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_soundscapes_asset ON soundscapes(asset_key)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_reading_progress_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reading_progress (
            user_id TEXT NOT NULL,
            book_id TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
            current_page INTEGER NOT NULL CHECK (current_page >= 1),
            updated_at TEXT NOT NULL,
            PRIMARY KEY (user_id, book_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_generation_failures_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS generation_failures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            book_id TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
            scene_id TEXT REFERENCES scenes(id) ON DELETE SET NULL,
            spread_index INTEGER,
            stage TEXT NOT NULL CHECK (stage IN ('analysis', 'generation')),
            reason TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_generation_failures_book ON generation_failures(book_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let pool = init_memory_database().await.unwrap();
        create_schema(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        assert_eq!(
            tables,
            vec![
                "books",
                "generation_failures",
                "pages",
                "reading_progress",
                "scenes",
                "soundscapes"
            ]
        );
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let pool = init_memory_database().await.unwrap();
        let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(enabled, 1);
    }
}
