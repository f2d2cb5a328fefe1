//! Whole-directory snapshots: the listed directories are archived into a
//! single versioned tarball.

use super::versioned::{archive, store_version};
use super::{BackupContext, BackupStats};
use crate::config::{BackupConfig, BackupParams};
use crate::ledger::Ledger;
use crate::storage::{StorageGateway, Storager};
use crate::utils::errors::{Result, SyncError};
use crate::utils::format::slugify;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const TYPE_NAME: &str = "dir_compress";

const MAX_NAME_LEN: usize = 99;

#[derive(Debug, Clone)]
pub struct DirCompress {
    pub(super) dirs: Vec<PathBuf>,
    pub(super) dirstorage: String,
    description: String,
    history: i64,
}

/// Split a directory into the `(parent, folder)` pair tar needs for `-C`.
fn split_dir(dir: &Path) -> Option<(String, String)> {
    let folder = dir.file_name()?.to_string_lossy().to_string();
    let parent = dir.parent()?.to_string_lossy().to_string();
    if parent.is_empty() || folder.is_empty() {
        return None;
    }
    Some((parent, folder))
}

impl DirCompress {
    pub fn init(config: &BackupConfig) -> Result<Self> {
        let BackupParams::DirCompress { dirs, history } = &config.params else {
            return Err(SyncError::Config(format!(
                "Backup '{}' is not a {}",
                config.name, TYPE_NAME
            )));
        };
        if dirs.is_empty() {
            return Err(SyncError::Config(format!(
                "Backup '{}': dirs must be provided",
                config.name
            )));
        }
        if let Some(missing) = dirs.iter().find(|d| !d.is_dir()) {
            return Err(SyncError::Config(format!(
                "Backup '{}': directory {} does not exist",
                config.name,
                missing.display()
            )));
        }

        let description = if config.description.trim().is_empty() {
            config.name.clone()
        } else {
            config.description.clone()
        };

        Ok(Self {
            dirs: dirs.clone(),
            dirstorage: config.dirstorage.clone(),
            description,
            history: *history,
        })
    }

    pub fn archive_name(&self, ctx: &BackupContext<'_>) -> String {
        format!(
            "{}_{}.tar.gz",
            slugify(&self.description, MAX_NAME_LEN),
            ctx.artifact_stamp()
        )
    }

    pub(super) async fn execute<G: StorageGateway>(
        &self,
        ledger: &mut Ledger,
        storager: &mut Storager<'_, G>,
        work_dir: &Path,
        ctx: &BackupContext<'_>,
        stats: &mut BackupStats,
    ) -> Result<()> {
        let mut entries = Vec::new();
        for dir in &self.dirs {
            match split_dir(dir) {
                Some(entry) => entries.push(entry),
                None => {
                    warn!(
                        dir = %dir.display(),
                        "Directory path cannot be split for archiving, skipping it"
                    );
                    stats
                        .warnings
                        .push(format!("Skipped {}: cannot be archived", dir.display()));
                }
            }
        }
        if entries.is_empty() {
            return Err(SyncError::Command("No directories to archive".into()));
        }

        let archive_path = work_dir.join(self.archive_name(ctx));
        archive(ctx, &archive_path, &entries).await?;

        store_version(
            ledger,
            storager,
            &archive_path,
            &self.dirstorage,
            TYPE_NAME,
            self.history,
            ctx,
            stats,
        )
        .await
    }
}
