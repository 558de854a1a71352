//! Run configuration.
//!
//! Settings come from three layers, later layers winning: an optional JSON
//! file, `REPOGRAPH_*` environment variables, then command-line flags. The
//! result is read once at the start of each run, so a changed setting takes
//! effect on the next run.

use crate::commit::CommitConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable enabling the bulk path.
pub const ENV_BULK_LOAD: &str = "REPOGRAPH_BULK_LOAD";
/// Environment variable for the upsert batch size.
pub const ENV_BATCH_SIZE: &str = "REPOGRAPH_BATCH_SIZE";
/// Environment variable for the per-group timeout in milliseconds.
pub const ENV_TIMEOUT_MS: &str = "REPOGRAPH_TIMEOUT_MS";
/// Environment variable for the artifact directory.
pub const ENV_ARTIFACT_DIR: &str = "REPOGRAPH_ARTIFACT_DIR";

/// Settings for one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// Attempt the bulk path (off until proven safe for the store).
    pub bulk_load: bool,
    /// Records per row-wise upsert batch.
    pub batch_size: usize,
    /// Bound for each group's store work on one path, in milliseconds.
    pub timeout_ms: u64,
    /// Directory for staged bulk artifacts.
    pub artifact_dir: PathBuf,
    /// Artifacts untouched for this long belong to a crashed run, in
    /// milliseconds. Never less than `timeout_ms` in effect.
    pub stale_artifact_ms: u64,
    /// Commit independent groups concurrently when the store allows it.
    pub parallel_groups: bool,
    /// Files larger than this are skipped.
    pub max_file_bytes: u64,
    /// Glob patterns (relative to the repository root) to leave out.
    pub exclude: Vec<String>,
    /// Walk hidden files and directories.
    pub include_hidden: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            bulk_load: false,
            batch_size: 500,
            timeout_ms: 30_000,
            artifact_dir: PathBuf::from(".repograph/import"),
            stale_artifact_ms: 10 * 60 * 1000,
            parallel_groups: false,
            max_file_bytes: 2 * 1024 * 1024,
            exclude: Vec::new(),
            include_hidden: false,
        }
    }
}

impl IngestConfig {
    /// Read a JSON config file; missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: IngestConfig = serde_json::from_str(&text).map_err(|e| Error::Config {
            message: format!("{}: {}", path.display(), e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `REPOGRAPH_*` variables from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `REPOGRAPH_*` variables from `lookup`.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup(ENV_BULK_LOAD) {
            self.bulk_load = parse_flag(ENV_BULK_LOAD, &value)?;
        }
        if let Some(value) = lookup(ENV_BATCH_SIZE) {
            self.batch_size = parse_number(ENV_BATCH_SIZE, &value)?;
        }
        if let Some(value) = lookup(ENV_TIMEOUT_MS) {
            self.timeout_ms = parse_number(ENV_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_ARTIFACT_DIR) {
            if !value.is_empty() {
                self.artifact_dir = PathBuf::from(value);
            }
        }
        self.validate()
    }

    /// Reject settings no run can use.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config {
                message: "batch_size must be at least 1".to_string(),
            });
        }
        if self.timeout_ms == 0 {
            return Err(Error::Config {
                message: "timeout_ms must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Per-group timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Minimum age of an artifact before a sweep may remove it.
    ///
    /// A live run loads each artifact within one group timeout of writing it.
    pub fn stale_artifact_age(&self) -> Duration {
        Duration::from_millis(self.stale_artifact_ms.max(self.timeout_ms))
    }

    /// Settings handed to the commit engine.
    pub fn commit_config(&self) -> CommitConfig {
        CommitConfig {
            bulk_load: self.bulk_load,
            batch_size: self.batch_size,
            timeout: self.timeout(),
            artifact_dir: self.artifact_dir.clone(),
            parallel_groups: self.parallel_groups,
        }
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::Config {
            message: format!("{} must be a boolean, got '{}'", key, other),
        }),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| Error::Config {
        message: format!("{} must be a non-negative integer, got '{}'", key, value),
    })
}
