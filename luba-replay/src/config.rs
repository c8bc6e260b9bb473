//! Configuration for the replay tool.

use std::path::{Path, PathBuf};
use std::time::Duration;

use luba_core::PostConfig;
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Link tuning for the simulated BLE session.
    pub link: LinkConfig,
    /// Map cache settings.
    pub map: MapConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Negotiated write size in bytes.
    pub chunk_size: usize,
    /// Pause between fragment writes in milliseconds.
    pub pacing_ms: u64,
    /// Ack wait bound in milliseconds.
    pub ack_timeout_ms: u64,
    pub require_ack: bool,
    /// Depth of the in-memory notification queue.
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Name the replayed device is registered under.
    pub device_name: String,
    /// HashList JSON to start from. Empty for a cold start.
    pub warm_start: String,
    /// Where to write the HashList after the replay. Empty to skip.
    pub save: String,
    /// Cap on planned requests printed; 0 for no cap.
    pub max_requests: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for LinkConfig {
    fn default() -> Self {
        let post = PostConfig::default();
        Self {
            chunk_size: post.chunk_size,
            pacing_ms: post.pacing.as_millis() as u64,
            ack_timeout_ms: post.ack_timeout.as_millis() as u64,
            require_ack: post.require_ack,
            queue_depth: 256,
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            device_name: "Luba-replay".into(),
            warm_start: String::new(),
            save: String::new(),
            max_requests: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ReplayConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    pub fn to_post_config(&self) -> PostConfig {
        PostConfig {
            chunk_size: self.link.chunk_size.max(1),
            pacing: Duration::from_millis(self.link.pacing_ms),
            ack_timeout: Duration::from_millis(self.link.ack_timeout_ms.max(1)),
            require_ack: self.link.require_ack,
        }
    }

    pub fn warm_start_path(&self) -> Option<PathBuf> {
        non_empty(&self.map.warm_start)
    }

    pub fn save_path(&self) -> Option<PathBuf> {
        non_empty(&self.map.save)
    }

    pub fn max_requests(&self) -> Option<usize> {
        (self.map.max_requests > 0).then_some(self.map.max_requests)
    }
}

fn non_empty(path: &str) -> Option<PathBuf> {
    (!path.is_empty()).then(|| PathBuf::from(path))
}

// ── Tests ────────────────────────────────────────────────────────
