//! Absorbed per-spread and per-scene failures, kept for admin review

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{format_timestamp, parse_optional_uuid, parse_timestamp};
use crate::{Error, Result};

/// Pipeline stage a failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Analysis,
    Generation,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Analysis => "analysis",
            FailureStage::Generation => "generation",
        }
    }
}

impl std::str::FromStr for FailureStage {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "analysis" => Ok(FailureStage::Analysis),
            "generation" => Ok(FailureStage::Generation),
            other => Err(Error::Validation(format!("Unknown failure stage '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub book_id: Uuid,
    pub scene_id: Option<Uuid>,
    pub spread_index: Option<u32>,
    pub stage: FailureStage,
    /// Human-readable reason shown in admin review
    pub reason: String,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

pub async fn record_failure(pool: &SqlitePool, failure: &FailureRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO generation_failures (book_id, scene_id, spread_index, stage,
                                         reason, attempts, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(failure.book_id.to_string())
    .bind(failure.scene_id.map(|id| id.to_string()))
    .bind(failure.spread_index.map(|i| i as i64))
    .bind(failure.stage.as_str())
    .bind(&failure.reason)
    .bind(failure.attempts as i64)
    .bind(format_timestamp(&failure.created_at))
    .execute(pool)
    .await?;
    Ok(())
}

/// Failures for a book, oldest first
pub async fn list_failures(pool: &SqlitePool, book_id: Uuid) -> Result<Vec<FailureRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT scene_id, spread_index, stage, reason, attempts, created_at
        FROM generation_failures
        WHERE book_id = ?
        ORDER BY id
        "#,
    )
    .bind(book_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let stage: String = row.get("stage");
            let created_at: String = row.get("created_at");
            Ok(FailureRecord {
                book_id,
                scene_id: parse_optional_uuid(row.get("scene_id"))?,
                spread_index: row.get::<Option<i64>, _>("spread_index").map(|i| i as u32),
                stage: stage.parse()?,
                reason: row.get("reason"),
                attempts: row.get::<i64, _>("attempts") as u32,
                created_at: parse_timestamp(&created_at)?,
            })
        })
        .collect()
}

/// Forget earlier failures before a book is reprocessed
pub async fn clear_failures(pool: &SqlitePool, book_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM generation_failures WHERE book_id = ?")
        .bind(book_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{books, init_memory_database};

    #[tokio::test]
    async fn test_record_and_list() {
        let pool = init_memory_database().await.unwrap();
        let book = books::create_book(&pool, "Alice").await.unwrap();

        record_failure(
            &pool,
            &FailureRecord {
                book_id: book.id,
                scene_id: None,
                spread_index: Some(2),
                stage: FailureStage::Analysis,
                reason: "rate limited".to_string(),
                attempts: 3,
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();

        let failures = list_failures(&pool, book.id).await.unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].spread_index, Some(2));
        assert_eq!(failures[0].stage, FailureStage::Analysis);
        assert_eq!(failures[0].attempts, 3);

        clear_failures(&pool, book.id).await.unwrap();
        assert!(list_failures(&pool, book.id).await.unwrap().is_empty());
    }
}
