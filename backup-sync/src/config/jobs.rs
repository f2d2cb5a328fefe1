//! Job definitions: which storages a job writes to and which backups it runs.

use super::parse::NumberOrText;
use crate::storage::Scheme;
use crate::utils::errors::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use walkdir::WalkDir;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub identity: Identity,
    #[serde(default)]
    pub storages: Vec<StorageConfig>,
    #[serde(default)]
    pub backups: Vec<BackupConfig>,
}

/// A job only applies on a machine where `dir` exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    GoogleStorage,
    AmazonS3,
    Local,
}

impl StorageKind {
    pub fn scheme(self) -> Scheme {
        match self {
            StorageKind::GoogleStorage => Scheme::Gs,
            StorageKind::AmazonS3 => Scheme::S3,
            StorageKind::Local => Scheme::File,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub kind: StorageKind,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Bucket name, or the root directory for `local` storage
    pub bucket: String,
    pub dirstorage: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Remote directory this backup owns, relative to the storage's own
    pub dirstorage: String,
    /// Minimum time between runs, `H:MM` or minutes
    #[serde(default)]
    pub frequency: Option<NumberOrText>,
    #[serde(flatten)]
    pub params: BackupParams,
}

/// Kind-specific settings, selected by the `type` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackupParams {
    DirIncrement {
        dir: PathBuf,
        maxupload: NumberOrText,
        #[serde(default)]
        includes: Vec<String>,
        #[serde(default)]
        excludes: Vec<String>,
    },
    DirCompress {
        dirs: Vec<PathBuf>,
        history: i64,
    },
    DbMongo {
        host: String,
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        password: Option<String>,
        history: i64,
    },
    DbMysql {
        host: String,
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        password: Option<String>,
        history: i64,
    },
}

impl BackupParams {
    pub fn type_name(&self) -> &'static str {
        match self {
            BackupParams::DirIncrement { .. } => "dir_increment",
            BackupParams::DirCompress { .. } => "dir_compress",
            BackupParams::DbMongo { .. } => "db_mongo",
            BackupParams::DbMysql { .. } => "db_mysql",
        }
    }
}

fn default_active() -> bool {
    true
}

/// A parsed job file.
#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,
    pub path: PathBuf,
    pub config: JobConfig,
}

impl Job {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: JobConfig = toml::from_str(&content)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            name,
            path: path.to_path_buf(),
            config,
        })
    }

    pub fn active_storages(&self) -> impl Iterator<Item = &StorageConfig> {
        self.config.storages.iter().filter(|s| s.active)
    }

    pub fn active_backups(&self) -> impl Iterator<Item = &BackupConfig> {
        self.config.backups.iter().filter(|b| b.active)
    }
}

fn is_job_file(path: &Path) -> bool {
    if path.extension().and_then(|e| e.to_str()) != Some("toml") {
        return false;
    }
    if path.components().any(|c| c.as_os_str().to_string_lossy().contains("EXAMPLES")) {
        return false;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    !(file_name.starts_with("OFF") || file_name.starts_with("notify-"))
}

/// Find and parse every job file under `jobs_dir`.
///
/// Unparseable files are logged and skipped; jobs whose identity directory
/// does not exist on this machine are skipped. It is an error when no job
/// file parses at all.
pub fn discover_jobs(jobs_dir: &Path) -> Result<Vec<Job>> {
    let mut parsed = 0usize;
    let mut jobs = Vec::new();

    for entry in WalkDir::new(jobs_dir).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                error!(error = %e, "Error reading jobs directory");
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file()
            || !is_job_file(path.strip_prefix(jobs_dir).unwrap_or(path))
        {
            continue;
        }

        let job = match Job::from_file(path) {
            Ok(job) => job,
            Err(e) => {
                error!(file = %path.display(), error = %e, "Skipping invalid job file");
                continue;
            }
        };
        parsed += 1;

        if !job.config.identity.dir.exists() {
            debug!(
                job = %job.name,
                identity = %job.config.identity.dir.display(),
                "Job does not apply to this machine"
            );
            continue;
        }

        info!(
            job = %job.name,
            storages = job.config.storages.len(),
            backups = job.config.backups.len(),
            "Job loaded"
        );
        jobs.push(job);
    }

    if parsed == 0 {
        return Err(SyncError::Config(format!(
            "No valid job files found in {}",
            jobs_dir.display()
        )));
    }

    Ok(jobs)
}
