//! Scene persistence

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, parse_uuid};
use crate::models::{validate_scene_ranges, Scene, SceneDescriptors};
use crate::{Error, Result};

const SCENE_COLUMNS: &str = "id, book_id, scene_number, start_page, end_page, page_spread_index, \
                             descriptors, audio_prompt, needs_curation, created_at";

/// Outcome of [`replace_book_scenes`]
#[derive(Debug, Clone)]
pub struct SceneReplacement {
    /// The book's scenes after commit, in scene order
    pub scenes: Vec<Scene>,
    /// Asset keys of soundscapes removed along with deleted scenes
    pub dropped_asset_keys: Vec<String>,
}

/// Replace a book's scenes, returning them as re-read after commit
///
/// See [`replace_book_scenes`]; callers that own stored assets should use
/// that instead so they can release the assets of deleted scenes.
pub async fn replace_scenes(pool: &SqlitePool, book_id: Uuid, scenes: Vec<Scene>) -> Result<Vec<Scene>> {
    Ok(replace_book_scenes(pool, book_id, scenes).await?.scenes)
}

/// Replace a book's scenes in one transaction
///
/// The new scenes are validated first; nothing is written if they overlap,
/// are inverted or are out of order. An existing scene with the same number
/// and the same shape is kept (with its id and soundscape), so re-running
/// segmentation on unchanged input changes nothing. Other existing scenes
/// are deleted, which cascades their soundscapes and clears the page links.
/// The asset keys of those soundscapes are returned; the files themselves
/// are left to the caller.
pub async fn replace_book_scenes(pool: &SqlitePool, book_id: Uuid, scenes: Vec<Scene>) -> Result<SceneReplacement> {
    if let Some(stray) = scenes.iter().find(|s| s.book_id != book_id) {
        return Err(Error::Validation(format!(
            "Scene {} belongs to book {}, not {}",
            stray.scene_number, stray.book_id, book_id
        )));
    }
    validate_scene_ranges(&scenes)?;

    let existing: HashMap<u32, Scene> = load_scenes(pool, book_id)
        .await?
        .into_iter()
        .map(|s| (s.scene_number, s))
        .collect();

    let mut kept_ids = Vec::new();
    let mut result = Vec::with_capacity(scenes.len());
    let mut to_insert = Vec::new();
    for scene in scenes {
        match existing.get(&scene.scene_number) {
            Some(old) if old.same_shape(&scene) => {
                kept_ids.push(old.id);
                result.push(old.clone());
            }
            _ => {
                result.push(scene.clone());
                to_insert.push(scene);
            }
        }
    }

    let book_id_str = book_id.to_string();
    let mut tx = pool.begin().await?;
    let mut dropped_asset_keys = Vec::new();

    for old in existing.values() {
        if !kept_ids.contains(&old.id) {
            let keys: Vec<String> = sqlx::query_scalar("SELECT asset_key FROM soundscapes WHERE scene_id = ?")
                .bind(old.id.to_string())
                .fetch_all(&mut *tx)
                .await?;
            dropped_asset_keys.extend(keys);

            sqlx::query("DELETE FROM scenes WHERE id = ?")
                .bind(old.id.to_string())
                .execute(&mut *tx)
                .await?;
        }
    }

    for scene in &to_insert {
        sqlx::query(
            r#"
            INSERT INTO scenes (id, book_id, scene_number, start_page, end_page,
                                page_spread_index, descriptors, audio_prompt,
                                needs_curation, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(scene.id.to_string())
        .bind(&book_id_str)
        .bind(scene.scene_number as i64)
        .bind(scene.start_page as i64)
        .bind(scene.end_page as i64)
        .bind(scene.page_spread_index as i64)
        .bind(scene.descriptors.to_json()?)
        .bind(&scene.audio_prompt)
        .bind(scene.needs_curation)
        .bind(format_timestamp(&scene.created_at))
        .execute(&mut *tx)
        .await?;
    }

    for scene in &result {
        sqlx::query(
            "UPDATE pages SET scene_id = ? WHERE book_id = ? AND page_number BETWEEN ? AND ?",
        )
        .bind(scene.id.to_string())
        .bind(&book_id_str)
        .bind(scene.start_page as i64)
        .bind(scene.end_page as i64)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(SceneReplacement {
        scenes: load_scenes(pool, book_id).await?,
        dropped_asset_keys,
    })
}

/// Scenes of a book in scene order
pub async fn load_scenes(pool: &SqlitePool, book_id: Uuid) -> Result<Vec<Scene>> {
    let sql = format!(
        "SELECT {} FROM scenes WHERE book_id = ? ORDER BY scene_number",
        SCENE_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(book_id.to_string())
        .fetch_all(pool)
        .await?;

    rows.iter().map(scene_from_row).collect()
}

pub async fn get_scene(pool: &SqlitePool, scene_id: Uuid) -> Result<Option<Scene>> {
    let sql = format!("SELECT {} FROM scenes WHERE id = ?", SCENE_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(scene_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(scene_from_row).transpose()
}

/// Like [`get_scene`], but a missing scene is `NotFound`
pub async fn load_scene(pool: &SqlitePool, scene_id: Uuid) -> Result<Scene> {
    get_scene(pool, scene_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Scene {}", scene_id)))
}

/// Flag or clear a scene for manual audio curation
pub async fn set_needs_curation(pool: &SqlitePool, scene_id: Uuid, needs_curation: bool) -> Result<()> {
    let result = sqlx::query("UPDATE scenes SET needs_curation = ? WHERE id = ?")
        .bind(needs_curation)
        .bind(scene_id.to_string())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Scene {}", scene_id)));
    }
    Ok(())
}

/// Delete one scene; its soundscape cascades and page links become NULL
pub async fn delete_scene(pool: &SqlitePool, scene_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM scenes WHERE id = ?")
        .bind(scene_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

fn scene_from_row(row: &SqliteRow) -> Result<Scene> {
    let id: String = row.get("id");
    let book_id: String = row.get("book_id");
    let descriptors: String = row.get("descriptors");
    let created_at: String = row.get("created_at");

    Ok(Scene {
        id: parse_uuid(&id)?,
        book_id: parse_uuid(&book_id)?,
        scene_number: row.get::<i64, _>("scene_number") as u32,
        start_page: row.get::<i64, _>("start_page") as u32,
        end_page: row.get::<i64, _>("end_page") as u32,
        page_spread_index: row.get::<i64, _>("page_spread_index") as u32,
        descriptors: SceneDescriptors::from_json(&descriptors)?,
        audio_prompt: row.get("audio_prompt"),
        needs_curation: row.get("needs_curation"),
        created_at: parse_timestamp(&created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{books, init_memory_database, pages};

    async fn book_with_pages(pool: &SqlitePool, count: u32) -> Uuid {
        let book = books::create_book(pool, "Alice").await.unwrap();
        let pages: Vec<(u32, String)> = (1..=count).map(|n| (n, format!("page {}", n))).collect();
        pages::insert_pages(pool, book.id, &pages).await.unwrap();
        book.id
    }

    fn scene(book_id: Uuid, number: u32, start: u32, end: u32, mood: &str) -> Scene {
        Scene::new(
            book_id,
            number,
            start,
            end,
            (start - 1) / 2,
            SceneDescriptors {
                mood: Some(mood.to_string()),
                ..Default::default()
            },
            format!("{} ambience", mood),
        )
    }

    #[tokio::test]
    async fn test_replace_links_pages() {
        let pool = init_memory_database().await.unwrap();
        let book_id = book_with_pages(&pool, 10).await;

        let stored = replace_scenes(
            &pool,
            book_id,
            vec![scene(book_id, 1, 1, 6, "calm"), scene(book_id, 2, 7, 10, "tense")],
        )
        .await
        .unwrap();

        let pages = pages::load_pages(&pool, book_id).await.unwrap();
        assert!(pages[..6].iter().all(|p| p.scene_id == Some(stored[0].id)));
        assert!(pages[6..].iter().all(|p| p.scene_id == Some(stored[1].id)));

        let loaded = load_scenes(&pool, book_id).await.unwrap();
        assert_eq!(loaded, stored);
    }

    #[tokio::test]
    async fn test_overlap_rejected_before_write() {
        let pool = init_memory_database().await.unwrap();
        let book_id = book_with_pages(&pool, 10).await;

        let err = replace_scenes(
            &pool,
            book_id,
            vec![scene(book_id, 1, 1, 6, "calm"), scene(book_id, 2, 5, 10, "tense")],
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert!(load_scenes(&pool, book_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_keeps_unchanged_scenes() {
        let pool = init_memory_database().await.unwrap();
        let book_id = book_with_pages(&pool, 10).await;

        let first = replace_scenes(
            &pool,
            book_id,
            vec![scene(book_id, 1, 1, 6, "calm"), scene(book_id, 2, 7, 10, "tense")],
        )
        .await
        .unwrap();

        let second = replace_scenes(
            &pool,
            book_id,
            vec![scene(book_id, 1, 1, 6, "calm"), scene(book_id, 2, 7, 10, "eerie")],
        )
        .await
        .unwrap();

        assert_eq!(first[0].id, second[0].id);
        assert_ne!(first[1].id, second[1].id);
        assert_eq!(load_scenes(&pool, book_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_replace_reports_assets_of_deleted_scenes() {
        use crate::db::soundscapes;
        use crate::models::{Soundscape, SoundscapeTags, SourceType};

        let pool = init_memory_database().await.unwrap();
        let book_id = book_with_pages(&pool, 10).await;
        let first = replace_scenes(
            &pool,
            book_id,
            vec![scene(book_id, 1, 1, 6, "calm"), scene(book_id, 2, 7, 10, "tense")],
        )
        .await
        .unwrap();

        for (stored, key) in first.iter().zip(["audio/generated/one.wav", "audio/generated/two.wav"]) {
            let soundscape = Soundscape {
                id: Uuid::new_v4(),
                scene_id: stored.id,
                audio_url: format!("/assets/{}", key),
                asset_key: key.to_string(),
                duration_seconds: 30,
                source_type: SourceType::Generated,
                confidence: None,
                generation_job_id: None,
                prompt: None,
                source_capability: None,
                fingerprint: "fp".to_string(),
                tags: SoundscapeTags::default(),
                created_at: chrono::Utc::now(),
            };
            soundscapes::assign_soundscape(&pool, &soundscape).await.unwrap();
        }

        let replacement = replace_book_scenes(
            &pool,
            book_id,
            vec![scene(book_id, 1, 1, 6, "calm"), scene(book_id, 2, 7, 10, "eerie")],
        )
        .await
        .unwrap();

        assert_eq!(replacement.dropped_asset_keys, vec!["audio/generated/two.wav".to_string()]);
        assert_eq!(replacement.scenes[0].id, first[0].id);
        assert_eq!(
            soundscapes::count_asset_references(&pool, "audio/generated/two.wav").await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_delete_scene_nulls_page_link() {
        let pool = init_memory_database().await.unwrap();
        let book_id = book_with_pages(&pool, 4).await;
        let stored = replace_scenes(&pool, book_id, vec![scene(book_id, 1, 1, 4, "calm")])
            .await
            .unwrap();

        assert!(delete_scene(&pool, stored[0].id).await.unwrap());

        let pages = pages::load_pages(&pool, book_id).await.unwrap();
        assert_eq!(pages.len(), 4);
        assert!(pages.iter().all(|p| p.scene_id.is_none()));
    }

    #[tokio::test]
    async fn test_needs_curation_flag() {
        let pool = init_memory_database().await.unwrap();
        let book_id = book_with_pages(&pool, 2).await;
        let stored = replace_scenes(&pool, book_id, vec![scene(book_id, 1, 1, 2, "calm")])
            .await
            .unwrap();

        set_needs_curation(&pool, stored[0].id, true).await.unwrap();
        assert!(load_scene(&pool, stored[0].id).await.unwrap().needs_curation);

        assert!(matches!(
            set_needs_curation(&pool, Uuid::new_v4(), true).await,
            Err(Error::NotFound(_))
        ));
    }
}
