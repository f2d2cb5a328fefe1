//! Incremental directory backup: only files that are new or changed since
//! the last successful upload are sent, up to a per-session byte budget.

use super::{BackupContext, BackupStats};
use crate::config::parse::parse_byte_size;
use crate::config::{BackupConfig, BackupParams};
use crate::fs::walker::{walk_directory, WalkOptions};
use crate::ledger::{FileRecord, Ledger};
use crate::storage::{StorageGateway, Storager};
use crate::sync::diff::total_size;
use crate::utils::errors::{Result, SyncError};
use crate::utils::format::format_bytes;
use std::path::PathBuf;
use tracing::{error, info};

pub const TYPE_NAME: &str = "dir_increment";

#[derive(Debug, Clone)]
pub struct DirIncrement {
    pub(super) dir: PathBuf,
    pub(super) dirstorage: String,
    maxupload: i64,
    options: WalkOptions,
}

impl DirIncrement {
    pub fn init(config: &BackupConfig) -> Result<Self> {
        let BackupParams::DirIncrement {
            dir,
            maxupload,
            includes,
            excludes,
        } = &config.params
        else {
            return Err(SyncError::Config(format!(
                "Backup '{}' is not a {}",
                config.name, TYPE_NAME
            )));
        };

        if !dir.is_dir() {
            return Err(SyncError::Config(format!(
                "Backup '{}': directory {} does not exist",
                config.name,
                dir.display()
            )));
        }
        for sub in includes.iter().chain(excludes) {
            if !dir.join(sub).is_dir() {
                return Err(SyncError::Config(format!(
                    "Backup '{}': subdirectory {} does not exist in {}",
                    config.name,
                    sub,
                    dir.display()
                )));
            }
        }

        Ok(Self {
            dir: dir.clone(),
            dirstorage: config.dirstorage.clone(),
            maxupload: parse_byte_size(maxupload)?,
            options: WalkOptions {
                includes: includes.iter().map(PathBuf::from).collect(),
                excludes: excludes.iter().map(PathBuf::from).collect(),
            },
        })
    }

    pub(super) async fn execute<G: StorageGateway>(
        &self,
        ledger: &mut Ledger,
        storager: &mut Storager<'_, G>,
        ctx: &BackupContext<'_>,
        stats: &mut BackupStats,
    ) -> Result<()> {
        ledger.clear_scratch()?;

        let files = walk_directory(&self.dir, &self.options)?;
        let records: Vec<FileRecord> = files.iter().map(|f| f.to_record()).collect();
        stats.local_files = ledger.record_locals(&records)?;
        stats.local_bytes = files.iter().map(|f| f.size).sum();

        let candidates = ledger.diff_against_known(self.maxupload)?;
        info!(
            dir = %self.dir.display(),
            local_files = stats.local_files,
            local_size = %format_bytes(stats.local_bytes),
            candidates = candidates.len(),
            candidates_size = %format_bytes(total_size(&candidates).max(0) as u64),
            "Scanned directory"
        );

        let result = self.transfer(ledger, storager, &candidates, ctx, stats).await;

        if stats.stored_files > 0 {
            ledger.record_stat(&ctx.date_str(), stats.stored_bytes as i64)?;
        }
        result
    }

    /// Store each candidate, committing it to `known` as soon as its
    /// upload succeeds.
    async fn transfer<G: StorageGateway>(
        &self,
        ledger: &Ledger,
        storager: &mut Storager<'_, G>,
        candidates: &[FileRecord],
        ctx: &BackupContext<'_>,
        stats: &mut BackupStats,
    ) -> Result<()> {
        let mut failures = 0usize;

        for candidate in candidates {
            let local = self.dir.join(&candidate.name);
            let suburl = match candidate.name.rsplit_once('/') {
                Some((parent, _)) => format!("{}/{}", self.dirstorage, parent),
                None => self.dirstorage.clone(),
            };

            match storager.store(&local, &suburl, Some(TYPE_NAME)).await {
                Ok(bytes) => {
                    ledger.commit_upload(candidate)?;
                    stats.stored_files += 1;
                    stats.stored_bytes += bytes;
                }
                Err(e) => {
                    failures += 1;
                    error!(file = %candidate.name, error = %e, "Error storing file");
                    stats
                        .warnings
                        .push(format!("Error storing {}: {}", candidate.name, e));
                    if ctx.max_failures > 0 && failures >= ctx.max_failures {
                        return Err(SyncError::TransferBudget { failures });
                    }
                }
            }
        }

        if failures > 0 {
            return Err(SyncError::Transfer { failed: failures });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupKind;
    use crate::config::parse::NumberOrText;
    use crate::config::{StorageConfig, StorageKind};
    use crate::storage::LocalGateway;
    use crate::utils::process::CommandRunner;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    fn backup_config(dir: &std::path::Path, maxupload: &str) -> BackupConfig {
        BackupConfig {
            name: "docs".into(),
            description: "Documents".into(),
            active: true,
            dirstorage: "docs".into(),
            frequency: None,
            params: BackupParams::DirIncrement {
                dir: dir.to_path_buf(),
                maxupload: NumberOrText::Text(maxupload.into()),
                includes: vec![],
                excludes: vec![],
            },
        }
    }

    fn storage(root: &std::path::Path) -> StorageConfig {
        StorageConfig {
            kind: StorageKind::Local,
            active: true,
            bucket: root.to_string_lossy().to_string(),
            dirstorage: "web01".into(),
        }
    }

    async fn run_once(
        kind: &BackupKind,
        gateway: &LocalGateway,
        remote: &std::path::Path,
        work: &std::path::Path,
    ) -> Result<BackupStats> {
        let runner = CommandRunner::default();
        let ctx = BackupContext {
            now: NaiveDate::from_ymd_opt(2026, 10, 16)
                .unwrap()
                .and_hms_opt(3, 0, 0)
                .unwrap(),
            runner: &runner,
            max_failures: 5,
        };
        let mut storager = Storager::init(gateway, &storage(remote), work, "2026-10-16")?;
        storager.execute().await?;
        let scratch = storager.backup_temp_dir()?;
        let execution = kind.execute(&mut storager, scratch.path(), &ctx).await?;
        let (stats, failure) = kind.cleanup(execution, &mut storager).await;
        storager.cleanup().await;
        match failure {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }

    #[tokio::test]
    async fn test_second_run_only_uploads_changes() -> Result<()> {
        let src = TempDir::new()?;
        let remote = TempDir::new()?;
        let work = TempDir::new()?;
        fs::create_dir_all(src.path().join("sub"))?;
        fs::write(src.path().join("a.txt"), b"aaaa")?;
        fs::write(src.path().join("sub/b.txt"), b"bb")?;

        let kind = BackupKind::init(&backup_config(src.path(), "0"))?;
        let gateway = LocalGateway::new(false);

        let first = run_once(&kind, &gateway, remote.path(), work.path()).await?;
        assert_eq!(first.stored_files, 2);
        assert_eq!(first.stored_bytes, 6);
        assert!(first.ledger_bytes.unwrap() > 0);
        assert!(first.warnings.iter().any(|w| w.contains("first run")));
        assert!(remote.path().join("web01/docs/a.txt").exists());
        assert!(remote.path().join("web01/docs/sub/b.txt").exists());
        assert!(remote.path().join("web01/docs/_ledger/dir_increment.db").exists());

        let second = run_once(&kind, &gateway, remote.path(), work.path()).await?;
        assert_eq!(second.stored_files, 0);
        assert_eq!(second.local_files, 2);
        assert!(second.warnings.is_empty());

        fs::write(src.path().join("sub/b.txt"), b"bbbbbb")?;
        fs::write(src.path().join("c.txt"), b"c")?;

        let third = run_once(&kind, &gateway, remote.path(), work.path()).await?;
        assert_eq!(third.stored_files, 2);
        assert_eq!(third.stored_bytes, 7);
        Ok(())
    }

    #[tokio::test]
    async fn test_budget_spreads_upload_over_runs() -> Result<()> {
        let src = TempDir::new()?;
        let remote = TempDir::new()?;
        let work = TempDir::new()?;
        fs::write(src.path().join("a.bin"), vec![1u8; 600])?;
        fs::write(src.path().join("b.bin"), vec![2u8; 600])?;

        let kind = BackupKind::init(&backup_config(src.path(), "1k"))?;
        let gateway = LocalGateway::new(false);

        let first = run_once(&kind, &gateway, remote.path(), work.path()).await?;
        assert_eq!(first.stored_files, 1);

        let second = run_once(&kind, &gateway, remote.path(), work.path()).await?;
        assert_eq!(second.stored_files, 1);

        let third = run_once(&kind, &gateway, remote.path(), work.path()).await?;
        assert_eq!(third.stored_files, 0);
        Ok(())
    }

    #[test]
    fn test_init_validates_directories() {
        let src = TempDir::new().unwrap();
        assert!(DirIncrement::init(&backup_config(&src.path().join("missing"), "1M")).is_err());
        assert!(DirIncrement::init(&backup_config(src.path(), "1X")).is_err());

        let mut cfg = backup_config(src.path(), "1M");
        if let BackupParams::DirIncrement { excludes, .. } = &mut cfg.params {
            excludes.push("nope".into());
        }
        assert!(DirIncrement::init(&cfg).is_err());
    }
}
