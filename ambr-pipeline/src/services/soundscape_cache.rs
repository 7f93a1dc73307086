//! Soundscape Cache
//!
//! Content-addressable lookup of previously rendered soundscapes, keyed by a
//! fingerprint of the scene's setting, mood and intensity. Hits are shared
//! across books. There is no eviction; an asset lives as long as a soundscape
//! row references it.
//!
//! Lookups and writes take no lock. Two scenes with the same fingerprint
//! processed at the same time may both miss and both generate.

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use ambr_common::db::soundscapes;
use ambr_common::models::{Scene, SceneDescriptors, Soundscape, SoundscapeTags, SourceType};
use ambr_common::Result;

/// Canonical cache key for a scene's tags
///
/// `setting=<v>|mood=<v>|intensity=<v>` with each value trimmed and
/// lower-cased; missing values are empty. Weather and time of day do not
/// take part.
pub fn fingerprint(descriptors: &SceneDescriptors) -> String {
    let value = |v: &Option<String>| v.as_deref().unwrap_or("").trim().to_lowercase();
    format!(
        "setting={}|mood={}|intensity={}",
        value(&descriptors.setting),
        value(&descriptors.mood),
        value(&descriptors.activity_level)
    )
}

/// A stored audio asset and its provenance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetReference {
    /// URL under the system's own storage namespace
    pub audio_url: String,
    pub asset_key: String,
    pub duration_seconds: u32,
    pub source_type: SourceType,
    pub confidence: Option<f64>,
    pub generation_job_id: Option<String>,
    pub prompt: Option<String>,
    pub source_capability: Option<String>,
}

impl AssetReference {
    /// Soundscape row binding this asset to `scene`
    pub fn to_soundscape(&self, scene: &Scene) -> Soundscape {
        Soundscape {
            id: Uuid::new_v4(),
            scene_id: scene.id,
            audio_url: self.audio_url.clone(),
            asset_key: self.asset_key.clone(),
            duration_seconds: self.duration_seconds,
            source_type: self.source_type,
            confidence: self.confidence,
            generation_job_id: self.generation_job_id.clone(),
            prompt: self.prompt.clone(),
            source_capability: self.source_capability.clone(),
            fingerprint: fingerprint(&scene.descriptors),
            tags: SoundscapeTags::from(&scene.descriptors),
            created_at: Utc::now(),
        }
    }
}

impl From<Soundscape> for AssetReference {
    fn from(soundscape: Soundscape) -> Self {
        Self {
            audio_url: soundscape.audio_url,
            asset_key: soundscape.asset_key,
            duration_seconds: soundscape.duration_seconds,
            source_type: soundscape.source_type,
            confidence: soundscape.confidence,
            generation_job_id: soundscape.generation_job_id,
            prompt: soundscape.prompt,
            source_capability: soundscape.source_capability,
        }
    }
}

/// Fingerprint lookup over persisted soundscapes
#[derive(Clone)]
pub struct SoundscapeCache {
    pool: SqlitePool,
}

impl SoundscapeCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Most recently created asset with this fingerprint, from any book
    pub async fn find(&self, fingerprint: &str) -> Result<Option<AssetReference>> {
        let hit = soundscapes::find_latest_by_fingerprint(&self.pool, fingerprint).await?;
        Ok(hit.map(AssetReference::from))
    }

    /// Persist `asset` as the scene's soundscape
    ///
    /// The written row is what later lookups with the same fingerprint hit.
    /// Returns the new row and the one it replaced.
    pub async fn store(&self, scene: &Scene, asset: &AssetReference) -> Result<(Soundscape, Option<Soundscape>)> {
        let soundscape = asset.to_soundscape(scene);
        let replaced = soundscapes::assign_soundscape(&self.pool, &soundscape).await?;
        tracing::debug!(
            scene_id = %scene.id,
            fingerprint = %soundscape.fingerprint,
            asset_key = %soundscape.asset_key,
            "Stored soundscape"
        );
        Ok((soundscape, replaced))
    }

    /// Look up the scene's fingerprint and, on a hit, assign the cached asset
    pub async fn reuse(&self, scene: &Scene) -> Result<Option<Soundscape>> {
        let key = fingerprint(&scene.descriptors);
        match self.find(&key).await? {
            Some(asset) => {
                tracing::debug!(scene_id = %scene.id, fingerprint = %key, "Soundscape cache hit");
                let (soundscape, _) = self.store(scene, &asset).await?;
                Ok(Some(soundscape))
            }
            None => {
                tracing::debug!(scene_id = %scene.id, fingerprint = %key, "Soundscape cache miss");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambr_common::db::{books, init_memory_database, scenes};

    fn tags(setting: &str, mood: &str, intensity: &str) -> SceneDescriptors {
        SceneDescriptors {
            setting: Some(setting.to_string()),
            mood: Some(mood.to_string()),
            activity_level: Some(intensity.to_string()),
            ..Default::default()
        }
    }

    async fn scene_in_new_book(pool: &SqlitePool, descriptors: SceneDescriptors) -> Scene {
        let book = books::create_book(pool, "Book").await.unwrap();
        let scene = Scene::new(book.id, 1, 1, 2, 0, descriptors, "prompt".into());
        scenes::replace_scenes(pool, book.id, vec![scene]).await.unwrap().remove(0)
    }

    fn asset(key: &str) -> AssetReference {
        AssetReference {
            audio_url: format!("/assets/{}", key),
            asset_key: key.to_string(),
            duration_seconds: 30,
            source_type: SourceType::Generated,
            confidence: Some(0.8),
            generation_job_id: Some("job-7".into()),
            prompt: Some("calm forest ambience".into()),
            source_capability: Some("fake-synth".into()),
        }
    }

    #[test]
    fn test_fingerprint_normalizes_and_ignores_weather() {
        let mut a = tags(" Forest", "CALM", "low");
        let b = tags("forest", "calm ", "Low");
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a), "setting=forest|mood=calm|intensity=low");

        a.weather = Some("rain".into());
        a.time_of_day = Some("night".into());
        assert_eq!(fingerprint(&a), fingerprint(&b));

        assert_ne!(fingerprint(&a), fingerprint(&tags("forest", "calm", "high")));
    }

    #[test]
    fn test_fingerprint_of_empty_tags() {
        assert_eq!(
            fingerprint(&SceneDescriptors::default()),
            "setting=|mood=|intensity="
        );
    }

    #[tokio::test]
    async fn test_hit_across_books_after_persist() {
        let pool = init_memory_database().await.unwrap();
        let cache = SoundscapeCache::new(pool.clone());

        let first = scene_in_new_book(&pool, tags("forest", "calm", "low")).await;
        assert!(cache.reuse(&first).await.unwrap().is_none());
        cache.store(&first, &asset("audio/generated/a.mp3")).await.unwrap();

        let second = scene_in_new_book(&pool, tags("Forest", "calm", "low")).await;
        let reused = cache.reuse(&second).await.unwrap().unwrap();

        assert_eq!(reused.scene_id, second.id);
        assert_eq!(reused.asset_key, "audio/generated/a.mp3");
        assert_eq!(reused.prompt.as_deref(), Some("calm forest ambience"));
        assert_eq!(reused.source_capability.as_deref(), Some("fake-synth"));
    }

    #[tokio::test]
    async fn test_find_returns_most_recent_match() {
        let pool = init_memory_database().await.unwrap();
        let cache = SoundscapeCache::new(pool.clone());
        let descriptors = tags("sea", "stormy", "high");

        let older = scene_in_new_book(&pool, descriptors.clone()).await;
        cache.store(&older, &asset("audio/generated/old.mp3")).await.unwrap();
        let newer = scene_in_new_book(&pool, descriptors.clone()).await;
        cache.store(&newer, &asset("audio/generated/new.mp3")).await.unwrap();

        let hit = cache.find(&fingerprint(&descriptors)).await.unwrap().unwrap();
        assert_eq!(hit.asset_key, "audio/generated/new.mp3");
    }

    #[tokio::test]
    async fn test_different_fingerprint_misses() {
        let pool = init_memory_database().await.unwrap();
        let cache = SoundscapeCache::new(pool.clone());

        let scene = scene_in_new_book(&pool, tags("forest", "calm", "low")).await;
        cache.store(&scene, &asset("audio/generated/a.mp3")).await.unwrap();

        let hit = cache
            .find(&fingerprint(&tags("forest", "calm", "medium")))
            .await
            .unwrap();
        assert!(hit.is_none());
    }
}
