//! Durable asset storage
//!
//! Assets are addressed by a stable key: `audio/{curated|generated}/{scene_id}.{ext}`.
//! The local implementation writes under the configured asset directory and
//! serves keys under the public base URL.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

use ambr_common::models::SourceType;
use ambr_common::{Error, Result};

/// Storage key for a scene's audio asset
pub fn asset_key(source_type: SourceType, scene_id: Uuid, extension: &str) -> String {
    format!("audio/{}/{}.{}", source_type.as_str(), scene_id, extension)
}

/// File extension for audio bytes, from their magic number
///
/// Falls back to `bin` when the format is not recognized.
pub fn detect_extension(bytes: &[u8]) -> &'static str {
    match infer::get(bytes) {
        Some(kind) if kind.matcher_type() == infer::MatcherType::Audio => kind.extension(),
        _ => "bin",
    }
}

#[async_trait]
pub trait AssetStorage: Send + Sync {
    /// Store `bytes` under `key`, returning the public URL
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String>;

    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Remove `key`; deleting a missing key is not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// Public URL for `key`
    fn url_for(&self, key: &str) -> String;
}

/// Filesystem-backed asset storage
pub struct LocalAssetStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalAssetStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(Error::Validation(format!("Invalid asset key '{}'", key)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl AssetStorage for LocalAssetStorage {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        // Write to a sibling temp file first so readers never see a partial asset
        let tmp = path.with_extension("part");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| Error::Storage(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to finalize {}: {}", path.display(), e)))?;

        tracing::debug!(key, bytes = bytes.len(), "Stored asset");
        Ok(self.url_for(key))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Asset {}", key)))
            }
            Err(e) => Err(Error::Storage(format!("Failed to read {}: {}", path.display(), e))),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(key, "Deleted asset");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("Failed to delete {}: {}", path.display(), e))),
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}
