//! Fetching soundscape assets and timelines

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use ambr_common::models::TimelineEntry;

use crate::error::{PlayerError, Result};

/// Source of raw asset bytes
#[async_trait]
pub trait AssetLoader: Send + Sync {
    async fn load(&self, audio_url: &str) -> Result<Vec<u8>>;
}

/// Loads assets from the pipeline service over HTTP
///
/// Relative asset URLs (`/assets/...`) resolve against `base_url`.
pub struct HttpAssetLoader {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAssetLoader {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PlayerError::Load(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{}", self.base_url, url)
        } else {
            format!("{}/{}", self.base_url, url)
        }
    }

    /// Playback timeline of a book
    pub async fn timeline(&self, book_id: Uuid) -> Result<Vec<TimelineEntry>> {
        let url = format!("{}/books/{}/timeline", self.base_url, book_id);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(PlayerError::Load(format!(
                "Timeline request for {} returned {}",
                book_id,
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| PlayerError::Load(format!("Malformed timeline: {}", e)))
    }
}

#[async_trait]
impl AssetLoader for HttpAssetLoader {
    async fn load(&self, audio_url: &str) -> Result<Vec<u8>> {
        let url = self.resolve(audio_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(PlayerError::Load(format!("{} returned {}", url, response.status())));
        }
        let bytes = response.bytes().await?;
        tracing::debug!(url = %url, bytes = bytes.len(), "Asset fetched");
        Ok(bytes.to_vec())
    }
}

/// Format hint from the URL's file extension
pub fn extension_hint(audio_url: &str) -> Option<&str> {
    let path = audio_url.split(['?', '#']).next()?;
    let file = path.rsplit('/').next()?;
    let (stem, ext) = file.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then_some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_urls() {
        let loader = HttpAssetLoader::new("http://localhost:5730/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            loader.resolve("/assets/generated/a.wav"),
            "http://localhost:5730/assets/generated/a.wav"
        );
        assert_eq!(loader.resolve("assets/a.wav"), "http://localhost:5730/assets/a.wav");
        assert_eq!(loader.resolve("https://cdn.example/a.mp3"), "https://cdn.example/a.mp3");
    }

    #[test]
    fn test_extension_hint() {
        assert_eq!(extension_hint("/assets/generated/abc.wav"), Some("wav"));
        assert_eq!(extension_hint("https://cdn.example/x.mp3?sig=1"), Some("mp3"));
        assert_eq!(extension_hint("/assets/noext"), None);
        assert_eq!(extension_hint("/assets/.hidden"), None);
    }
}
