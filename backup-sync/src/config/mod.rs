//! Configuration management for the backup synchronizer.
//!
//! The application config is a single TOML file; job definitions live in
//! their own TOML files under `paths.jobs_dir` (see [`jobs`]).

pub mod jobs;
pub mod parse;

use crate::utils::errors::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use jobs::{
    discover_jobs, BackupConfig, BackupParams, Identity, Job, JobConfig, StorageConfig, StorageKind,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub paths: PathsConfig,
    #[serde(default)]
    pub storage: StorageToolConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Scratch space; emptied at the start of every run
    pub work_dir: PathBuf,

    /// Directory searched recursively for job definition files
    pub jobs_dir: PathBuf,

    /// Run-log file (default: `<work_dir>/runlog.ini`)
    #[serde(default)]
    pub runlog: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageToolConfig {
    /// Copy tool used for remote storage (`gsutil` style cp/rm)
    #[serde(default = "default_tool")]
    pub tool: String,

    /// Directory containing the tool, if it is not on PATH
    #[serde(default)]
    pub tool_dir: Option<PathBuf>,

    /// Upper bound for any single external command, in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout: u64,

    /// Log transfers instead of performing them
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Failed file transfers tolerated per backup before it is aborted
    #[serde(default = "default_max_failures")]
    pub max_failures: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_tool() -> String {
    "gsutil".to_string()
}

fn default_command_timeout() -> u64 {
    3600
}

fn default_max_failures() -> usize {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageToolConfig {
    fn default() -> Self {
        Self {
            tool: default_tool(),
            tool_dir: None,
            command_timeout: default_command_timeout(),
            dry_run: false,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_failures: default_max_failures(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            paths: PathsConfig {
                work_dir: PathBuf::from("/var/lib/backup-sync/work"),
                jobs_dir: PathBuf::from("/etc/backup-sync/jobs"),
                runlog: None,
            },
            storage: StorageToolConfig::default(),
            transfer: TransferConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn runlog_path(&self) -> PathBuf {
        self.paths
            .runlog
            .clone()
            .unwrap_or_else(|| self.paths.work_dir.join("runlog.ini"))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.storage.command_timeout)
    }
}
