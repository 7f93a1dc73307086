//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file. Lookup order:
//! 1. `--config` command-line argument
//! 2. `AMBR_CONFIG` environment variable
//! 3. `~/.config/ambr/ambr-pipeline.toml`
//! 4. `/etc/ambr/ambr-pipeline.toml`
//! 5. Built-in defaults
//!
//! Every field has a default so a partial file is valid.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const CONFIG_ENV_VAR: &str = "AMBR_CONFIG";
pub const ROOT_FOLDER_ENV_VAR: &str = "AMBR_ROOT_FOLDER";
pub const ANALYSIS_KEY_ENV_VAR: &str = "AMBR_ANALYSIS_API_KEY";
pub const SYNTHESIS_KEY_ENV_VAR: &str = "AMBR_SYNTHESIS_API_KEY";

const CONFIG_FILE_NAME: &str = "ambr-pipeline.toml";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TomlConfig {
    /// Root folder for the database and local assets
    pub root_folder: Option<PathBuf>,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub analysis: AnalysisConfig,
    pub synthesis: SynthesisConfig,
    pub retry: RetryConfig,
    pub queues: QueueConfig,
    pub storage: StorageConfig,
    pub pagination: PaginationConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 5730,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Log file path (logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "ambr_pipeline=info,ambr_common=info".to_string(),
            file: None,
        }
    }
}

/// Content-analysis capability settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub requests_per_second: u32,
    pub timeout_ms: u64,
    /// Pages per analysis window (2 = one spread)
    pub pages_per_window: u32,
    /// Cost units charged per call
    pub unit_cost: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8081/analyze".to_string(),
            api_key: None,
            requests_per_second: 5,
            timeout_ms: 30_000,
            pages_per_window: 2,
            unit_cost: 0.002,
        }
    }
}

impl AnalysisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Audio-synthesis capability settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub requests_per_second: u32,
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub poll_timeout_ms: u64,
    pub default_duration_seconds: u32,
    pub unit_cost: f64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8082".to_string(),
            api_key: None,
            requests_per_second: 2,
            timeout_ms: 60_000,
            poll_interval_ms: 3_000,
            poll_timeout_ms: 300_000,
            default_duration_seconds: crate::models::DEFAULT_DURATION_SECONDS,
            unit_cost: 0.05,
        }
    }
}

impl SynthesisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Backoff policy for transient upstream failures
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound of random jitter added to each delay
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 8_000,
            jitter_ms: 250,
        }
    }
}

/// Concurrency limit per named queue
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub extraction: usize,
    pub analysis: usize,
    pub generation: usize,
    /// Pending books accepted before enqueue is refused
    pub backlog: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            extraction: 2,
            analysis: 3,
            generation: 3,
            backlog: 64,
        }
    }
}

/// Durable asset storage
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Asset directory; relative paths resolve against the root folder
    pub asset_dir: PathBuf,
    /// URL prefix under which stored assets are served
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            asset_dir: PathBuf::from("assets"),
            public_base_url: "/assets".to_string(),
        }
    }
}

/// How uploaded plain text is split into pages
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Target characters per page
    pub page_chars: usize,
    /// Trimmed pages shorter than this are dropped
    pub min_page_chars: usize,
    /// Regex marking where the body starts; front matter is paginated on its own
    pub body_marker: Option<String>,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_chars: 1500,
            min_page_chars: 50,
            body_marker: None,
        }
    }
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load configuration following the lookup order
    ///
    /// An explicitly named file that does not exist is an error. When no file
    /// is found in the default locations, built-in defaults are used.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let explicit = cli_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from));

        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!("Config file not found: {}", path.display())));
                }
                Some(path)
            }
            None => default_config_locations().into_iter().find(|p| p.exists()),
        };

        let mut config = match path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                let content = std::fs::read_to_string(&path)?;
                Self::from_toml_str(&content)?
            }
            None => {
                info!("No configuration file found, using built-in defaults");
                Self::default()
            }
        };

        config.apply_env_overrides(
            std::env::var(ANALYSIS_KEY_ENV_VAR).ok(),
            std::env::var(SYNTHESIS_KEY_ENV_VAR).ok(),
        );
        config.validate()?;
        Ok(config)
    }

    /// Environment API keys take precedence over TOML values
    pub fn apply_env_overrides(&mut self, analysis_key: Option<String>, synthesis_key: Option<String>) {
        if let Some(key) = analysis_key.filter(|k| !k.is_empty()) {
            if self.analysis.api_key.is_some() {
                warn!("{} overrides analysis.api_key from TOML", ANALYSIS_KEY_ENV_VAR);
            }
            self.analysis.api_key = Some(key);
        }
        if let Some(key) = synthesis_key.filter(|k| !k.is_empty()) {
            if self.synthesis.api_key.is_some() {
                warn!("{} overrides synthesis.api_key from TOML", SYNTHESIS_KEY_ENV_VAR);
            }
            self.synthesis.api_key = Some(key);
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if self.queues.extraction == 0 || self.queues.analysis == 0 || self.queues.generation == 0 {
            return Err(Error::Config("queue concurrency limits must be at least 1".to_string()));
        }
        if self.analysis.requests_per_second == 0 || self.synthesis.requests_per_second == 0 {
            return Err(Error::Config("requests_per_second must be at least 1".to_string()));
        }
        if self.synthesis.poll_interval_ms == 0 {
            return Err(Error::Config("synthesis.poll_interval_ms must be positive".to_string()));
        }
        if self.analysis.pages_per_window == 0 {
            return Err(Error::Config("analysis.pages_per_window must be at least 1".to_string()));
        }
        if self.pagination.page_chars == 0 {
            return Err(Error::Config("pagination.page_chars must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn default_config_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join("ambr").join(CONFIG_FILE_NAME));
    }
    if cfg!(unix) {
        locations.push(PathBuf::from("/etc/ambr").join(CONFIG_FILE_NAME));
    }
    locations
}

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. `AMBR_ROOT_FOLDER` environment variable
/// 3. TOML `root_folder`
/// 4. OS-dependent default
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_value: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV_VAR) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = toml_value {
        return path.to_path_buf();
    }

    default_root_folder()
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/ambr
        dirs::data_local_dir()
            .map(|d| d.join("ambr"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/ambr"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("ambr"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/ambr"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("ambr"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\ambr"))
    } else {
        PathBuf::from("./ambr_data")
    }
}
