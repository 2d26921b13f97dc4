//! # Configuration Management Module
//!
//! Structured TOML configuration for the snapshot service, with defaults for
//! every value so an absent file still yields a runnable setup.
//!
//! ## Configuration Structure
//!
//! - [`ServerConfig`] - HTTP listener settings
//! - [`StorageConfig`] - Snapshot ring capacity and data directory
//! - [`LoggingConfig`] - Logging and debugging settings
//!
//! ## Usage
//!
//! ```rust,no_run
//! use statekeep::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("Ring capacity: {}", config.storage.max_snapshots);
//!
//!     Config::create_default("config.toml").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8787"
//! max_body_bytes = 1048576
//!
//! [storage]
//! data_dir = "./data/state"
//! max_snapshots = 10
//! max_snapshot_bytes = 1048576
//! max_document_bytes = 50331648
//!
//! [logging]
//! level = "info"
//! file = "statekeep.log"
//! ```
//!
//! ## Environment Integration
//!
//! Precedence: CLI args > Environment > Config file > Defaults. Recognised
//! variables are `STATEKEEP_BIND`, `STATEKEEP_DATA_DIR` and
//! `STATEKEEP_MAX_SNAPSHOTS`.
//!
//! ## Size Limits
//!
//! `storage.max_snapshot_bytes` bounds one normalized snapshot and
//! `storage.max_document_bytes` bounds a whole per-user document. The document
//! limit actually enforced is [`StorageConfig::document_limit`], which never
//! drops below what a full ring of maximum-size snapshots needs once
//! pretty-printed. [`Config::reconcile`] raises the snapshot limit to the HTTP
//! body limit so every accepted body can be stored.

use anyhow::{anyhow, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

pub const ENV_BIND: &str = "STATEKEEP_BIND";
pub const ENV_DATA_DIR: &str = "STATEKEEP_DATA_DIR";
pub const ENV_MAX_SNAPSHOTS: &str = "STATEKEEP_MAX_SNAPSHOTS";

pub const DEFAULT_MAX_SNAPSHOTS: usize = 10;

/// Worst-case growth of a compact snapshot once pretty-printed inside a document.
pub const PRETTY_OVERHEAD_FACTOR: u64 = 4;

/// Room for the document envelope on top of the per-snapshot allowance.
pub const DOCUMENT_SLACK_BYTES: u64 = 64 * 1024;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address for the HTTP listener.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Upper bound on POST bodies, in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind(), max_body_bytes: default_max_body_bytes() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// One `<user>.json` document per player lives here.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Ring capacity per user. Oldest entries are evicted beyond this.
    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: usize,
    /// Largest normalized snapshot (compact JSON) an append accepts.
    #[serde(default = "default_max_snapshot_bytes")]
    pub max_snapshot_bytes: u64,
    /// Lower bound on the document size limit; see [`StorageConfig::document_limit`].
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data/state")
}

fn default_max_snapshots() -> usize {
    DEFAULT_MAX_SNAPSHOTS
}

fn default_max_snapshot_bytes() -> u64 {
    1024 * 1024
}

fn default_max_document_bytes() -> u64 {
    48 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_snapshots: default_max_snapshots(),
            max_snapshot_bytes: default_max_snapshot_bytes(),
            max_document_bytes: default_max_document_bytes(),
        }
    }
}

impl StorageConfig {
    /// Convenience for tests and embedding: defaults rooted at `data_dir`.
    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into(), ..Self::default() }
    }

    pub fn with_max_snapshots(mut self, max_snapshots: usize) -> Self {
        self.max_snapshots = max_snapshots;
        self
    }

    /// Ring capacity with the zero case clamped to one.
    pub fn capacity(&self) -> usize {
        if self.max_snapshots == 0 {
            warn!("storage.max_snapshots = 0 is invalid; using 1");
            1
        } else {
            self.max_snapshots
        }
    }

    /// Size limit applied to documents on read and on write.
    ///
    /// At least `max_document_bytes`, and never less than a full ring of
    /// `max_snapshot_bytes` entries with pretty-print overhead, so a document
    /// the store wrote itself always reads back.
    pub fn document_limit(&self) -> u64 {
        let ring = (self.max_snapshots.max(1) as u64)
            .saturating_mul(self.max_snapshot_bytes)
            .saturating_mul(PRETTY_OVERHEAD_FACTOR)
            .saturating_add(DOCUMENT_SLACK_BYTES);
        self.max_document_bytes.max(ring)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), file: None }
    }
}

impl Config {
    /// Load configuration from file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is missing.
    pub async fn load_or_default(path: &str) -> Result<Self> {
        match fs::metadata(path).await {
            Ok(_) => Self::load(path).await,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(anyhow!("Failed to stat config file {}: {}", path, e)),
        }
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Make the server and storage limits agree: a body the listener accepts
    /// must also fit the per-snapshot limit.
    pub fn reconcile(&mut self) {
        let body = self.server.max_body_bytes as u64;
        if self.storage.max_snapshot_bytes < body {
            warn!(
                "storage.max_snapshot_bytes ({}) is below server.max_body_bytes ({}); raising it",
                self.storage.max_snapshot_bytes, body
            );
            self.storage.max_snapshot_bytes = body;
        }
    }

    /// Apply `STATEKEEP_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(bind) = lookup(ENV_BIND) {
            self.server.bind = bind;
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(ENV_MAX_SNAPSHOTS) {
            self.storage.max_snapshots = raw
                .trim()
                .parse()
                .map_err(|e| anyhow!("Invalid {}={:?}: {}", ENV_MAX_SNAPSHOTS, raw, e))?;
        }
        Ok(())
    }
}
