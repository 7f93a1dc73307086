//! Runtime settings for ambr-pipeline
//!
//! Wraps the bootstrap [`TomlConfig`] with the resolved root folder and
//! derives filesystem locations from it:
//!
//! ```text
//! {root}/ambr.db        SQLite database
//! {root}/assets/...     stored soundscape assets (unless asset_dir is absolute)
//! ```

use std::path::{Path, PathBuf};

use ambr_common::config::{resolve_root_folder, TomlConfig};
use ambr_common::{Error, Result};

use crate::services::{AnalysisOptions, GeneratorTimings, JobQueues, PaginationOptions, PipelineSettings};
use crate::utils::retry::RetryPolicy;

pub const DATABASE_FILE: &str = "ambr.db";

#[derive(Debug, Clone)]
pub struct Settings {
    pub config: TomlConfig,
    pub root_folder: PathBuf,
}

impl Settings {
    /// Resolve the root folder (CLI → env → TOML → OS default)
    pub fn resolve(config: TomlConfig, cli_root_folder: Option<&Path>) -> Self {
        let root_folder = resolve_root_folder(cli_root_folder, config.root_folder.as_deref());
        Self { config, root_folder }
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }

    pub fn asset_dir(&self) -> PathBuf {
        let configured = &self.config.storage.asset_dir;
        if configured.is_absolute() {
            configured.clone()
        } else {
            self.root_folder.join(configured)
        }
    }

    /// Create the root folder and asset directory if missing
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [self.root_folder.clone(), self.asset_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                Error::Config(format!("Failed to create directory {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.config.server.bind_address, self.config.server.port)
    }

    /// Local path the public asset URL is served from, when it is a path
    pub fn asset_route(&self) -> Option<String> {
        let base = self.config.storage.public_base_url.trim_end_matches('/');
        (base.starts_with('/') && base.len() > 1).then(|| base.to_string())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_config(&self.config.retry)
    }

    pub fn queues(&self) -> JobQueues {
        JobQueues::from_config(&self.config.queues)
    }

    pub fn analysis_options(&self) -> AnalysisOptions {
        AnalysisOptions {
            pages_per_window: self.config.analysis.pages_per_window,
        }
    }

    /// Splitting rules for uploaded text; an invalid body marker is a config error
    pub fn pagination_options(&self) -> Result<PaginationOptions> {
        let pagination = &self.config.pagination;
        let options = PaginationOptions {
            page_chars: pagination.page_chars,
            min_page_chars: pagination.min_page_chars,
            body_marker: None,
        };
        match pagination.body_marker.as_deref() {
            Some(pattern) => options
                .with_body_marker(pattern)
                .map_err(|e| Error::Config(format!("pagination.body_marker: {}", e))),
            None => Ok(options),
        }
    }

    pub fn generator_timings(&self) -> GeneratorTimings {
        GeneratorTimings::from_config(&self.config.synthesis)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings::from_config(&self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_derive_from_root() {
        let settings = Settings::resolve(TomlConfig::default(), Some(Path::new("/srv/ambr")));

        assert_eq!(settings.database_path(), PathBuf::from("/srv/ambr/ambr.db"));
        assert_eq!(settings.asset_dir(), PathBuf::from("/srv/ambr/assets"));
        assert_eq!(settings.bind_address(), "127.0.0.1:5730");
        assert_eq!(settings.asset_route().as_deref(), Some("/assets"));
    }

    #[test]
    fn test_absolute_asset_dir_and_remote_base_url() {
        let mut config = TomlConfig::default();
        config.storage.asset_dir = PathBuf::from("/var/lib/ambr-assets");
        config.storage.public_base_url = "https://cdn.example.com/ambr".to_string();
        let settings = Settings::resolve(config, Some(Path::new("/srv/ambr")));

        assert_eq!(settings.asset_dir(), PathBuf::from("/var/lib/ambr-assets"));
        assert_eq!(settings.asset_route(), None);
    }

    #[test]
    fn test_pagination_options_from_config() {
        let mut config = TomlConfig::default();
        config.pagination.page_chars = 800;
        config.pagination.body_marker = Some("(?m)^Chapter 1$".to_string());
        let settings = Settings::resolve(config, Some(Path::new("/srv/ambr")));

        let options = settings.pagination_options().unwrap();
        assert_eq!(options.page_chars, 800);
        assert_eq!(options.min_page_chars, 50);
        assert!(options.body_marker.unwrap().is_match("Preface\nChapter 1\nIt began"));

        let mut config = TomlConfig::default();
        config.pagination.body_marker = Some("(unclosed".to_string());
        let settings = Settings::resolve(config, None);
        assert!(matches!(settings.pagination_options(), Err(Error::Config(_))));
    }

    #[test]
    fn test_ensure_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().join("nested/root");
        let settings = Settings::resolve(TomlConfig::default(), Some(&root));

        settings.ensure_directories().unwrap();
        assert!(root.join("assets").is_dir());
    }
}
