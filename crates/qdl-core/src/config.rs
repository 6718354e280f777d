//! Engine configuration.
//!
//! Loaded from `~/.config/qdl/config.toml`; an explicit value passed
//! into the engine at construction and updated via `update_config`,
//! never read from ambient global state.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::conflict::ConflictPolicy;
use crate::retry::RetryPolicy;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per transfer (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 0.25,
            max_delay_secs: 30,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(self.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

/// Global engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum tasks transferring at once (admission budget).
    pub max_concurrent_downloads: usize,
    /// Default segment count for new direct tasks.
    pub segment_count: usize,
    /// Lower bound when the user shrinks segment count at runtime.
    pub min_segments: usize,
    /// Upper bound when the user grows segment count at runtime.
    pub max_segments: usize,
    /// Default destination directory. Empty = current directory.
    #[serde(default)]
    pub download_dir: Option<String>,
    /// Behavior when the destination file already exists.
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    /// Optional retry policy; built-in defaults when missing.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// A worker with no progress for this long counts as failed.
    pub stall_timeout_secs: u64,
    /// How often torrent backend progress is polled.
    pub torrent_poll_interval_ms: u64,
    /// Keep seeding torrents after completion.
    #[serde(default)]
    pub seed_after_complete: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 3,
            segment_count: 4,
            min_segments: 1,
            max_segments: 16,
            download_dir: None,
            conflict_policy: ConflictPolicy::default(),
            retry: None,
            stall_timeout_secs: 60,
            torrent_poll_interval_ms: 500,
            seed_after_complete: false,
        }
    }
}

impl EngineConfig {
    /// Effective retry policy (configured or defaults).
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
            .as_ref()
            .map(|r| r.policy())
            .unwrap_or_default()
    }

    /// Clamp a requested segment count to the configured bounds.
    pub fn clamp_segments(&self, requested: usize) -> usize {
        requested
            .max(self.min_segments.max(1))
            .min(self.max_segments.max(1))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("qdl")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<EngineConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = EngineConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: EngineConfig = toml::from_str(&data)?;
    Ok(cfg)
}
