//! Backup kinds and their execution lifecycle.
//!
//! Every kind goes through the same three steps against one storage
//! target: [`BackupKind::init`] validates the definition before any I/O,
//! [`BackupKind::execute`] restores the kind's ledger and does the work,
//! and [`BackupKind::cleanup`] ships the ledger back to storage whether
//! or not the work succeeded.

pub mod db_dump;
pub mod dir_compress;
pub mod dir_increment;
mod versioned;

use crate::config::{BackupConfig, BackupParams};
use crate::ledger::Ledger;
use crate::storage::storager::LEDGER_DIR;
use crate::storage::{canonical_dirstorage, StorageGateway, Storager};
use crate::utils::errors::{Result, SyncError};
use crate::utils::format::format_bytes;
use crate::utils::process::CommandRunner;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, error, info, warn};

pub use db_dump::{DbDump, DbEngine};
pub use dir_compress::DirCompress;
pub use dir_increment::DirIncrement;

/// Run-wide values shared by every backup.
#[derive(Debug, Clone, Copy)]
pub struct BackupContext<'a> {
    /// Session time, used for artifact names, version timestamps and stats
    pub now: NaiveDateTime,
    pub runner: &'a CommandRunner,
    /// Failed file transfers tolerated before a backup gives up
    pub max_failures: usize,
}

impl BackupContext<'_> {
    pub fn date_str(&self) -> String {
        self.now.format("%Y-%m-%d_%H-%M").to_string()
    }

    /// Stamp for artifact names. Resolves to the second, like
    /// [`timestamp`](Self::timestamp), so two versions never share a name.
    pub fn artifact_stamp(&self) -> String {
        self.now.format("%Y-%m-%d_%H-%M-%S").to_string()
    }

    pub fn timestamp(&self) -> i64 {
        self.now.and_utc().timestamp()
    }
}

/// What one backup did on one storage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackupStats {
    pub stored_files: usize,
    pub stored_bytes: u64,
    pub local_files: usize,
    pub local_bytes: u64,
    pub ledger_bytes: Option<u64>,
    pub pruned: Vec<String>,
    pub warnings: Vec<String>,
}

/// State carried from [`BackupKind::execute`] to [`BackupKind::cleanup`].
pub struct Execution {
    pub stats: BackupStats,
    ledger: Option<Ledger>,
    failure: Option<SyncError>,
}

impl Execution {
    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

pub enum BackupKind {
    DirIncrement(DirIncrement),
    DirCompress(DirCompress),
    DbDump(DbDump),
}

impl BackupKind {
    /// Validate a backup definition.
    pub fn init(config: &BackupConfig) -> Result<Self> {
        if canonical_dirstorage(&config.dirstorage).is_none() {
            return Err(SyncError::Config(format!(
                "Backup '{}': dirstorage '{}' is empty or climbs above the bucket",
                config.name, config.dirstorage
            )));
        }
        let kind = match &config.params {
            BackupParams::DirIncrement { .. } => {
                BackupKind::DirIncrement(DirIncrement::init(config)?)
            }
            BackupParams::DirCompress { .. } => BackupKind::DirCompress(DirCompress::init(config)?),
            BackupParams::DbMongo { .. } | BackupParams::DbMysql { .. } => {
                BackupKind::DbDump(DbDump::init(config)?)
            }
        };
        Ok(kind)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            BackupKind::DirIncrement(_) => dir_increment::TYPE_NAME,
            BackupKind::DirCompress(_) => dir_compress::TYPE_NAME,
            BackupKind::DbDump(b) => b.engine().type_name(),
        }
    }

    pub fn dirstorage(&self) -> &str {
        match self {
            BackupKind::DirIncrement(b) => &b.dirstorage,
            BackupKind::DirCompress(b) => &b.dirstorage,
            BackupKind::DbDump(b) => &b.dirstorage,
        }
    }

    fn source(&self) -> String {
        match self {
            BackupKind::DirIncrement(b) => b.dir.display().to_string(),
            BackupKind::DirCompress(b) => b
                .dirs
                .iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>()
                .join(","),
            BackupKind::DbDump(b) => b.host.clone(),
        }
    }

    fn ledger_file(&self) -> String {
        format!("{}.db", self.type_name())
    }

    /// Restore the ledger and run the backup in `work_dir`.
    ///
    /// Returns `Err` only when the ledger could not be brought up; failures
    /// after that are carried in the [`Execution`] so cleanup still runs.
    pub async fn execute<G: StorageGateway>(
        &self,
        storager: &mut Storager<'_, G>,
        work_dir: &Path,
        ctx: &BackupContext<'_>,
    ) -> Result<Execution> {
        let mut stats = BackupStats::default();
        let mut ledger = self.restore_ledger(storager, work_dir, &mut stats).await?;
        let remote = storager.url([self.dirstorage()]);
        ledger.update_params(&self.source(), &remote)?;

        let result = match self {
            BackupKind::DirIncrement(b) => {
                b.execute(&mut ledger, storager, ctx, &mut stats).await
            }
            BackupKind::DirCompress(b) => {
                b.execute(&mut ledger, storager, work_dir, ctx, &mut stats).await
            }
            BackupKind::DbDump(b) => {
                b.execute(&mut ledger, storager, work_dir, ctx, &mut stats).await
            }
        };

        Ok(Execution {
            stats,
            ledger: Some(ledger),
            failure: result.err(),
        })
    }

    /// Upload the ledger and settle the outcome of `execution`.
    ///
    /// The stats come back whether or not the backup failed, so partial
    /// progress and per-file warnings reach the report either way.
    pub async fn cleanup<G: StorageGateway>(
        &self,
        execution: Execution,
        storager: &mut Storager<'_, G>,
    ) -> (BackupStats, Option<SyncError>) {
        let Execution {
            mut stats,
            ledger,
            mut failure,
        } = execution;

        if let Some(ledger) = ledger {
            match self.store_ledger(storager, ledger).await {
                Ok(size) => stats.ledger_bytes = Some(size),
                Err(e) => {
                    error!(backup = self.type_name(), error = %e, "Error storing ledger");
                    failure.get_or_insert(e);
                }
            }
        }

        (stats, failure)
    }

    async fn restore_ledger<G: StorageGateway>(
        &self,
        storager: &mut Storager<'_, G>,
        work_dir: &Path,
        stats: &mut BackupStats,
    ) -> Result<Ledger> {
        let suburl = format!("{}/{}", self.dirstorage(), LEDGER_DIR);
        let file = self.ledger_file();
        match storager.restore(&suburl, &file, work_dir).await {
            Ok(path) => debug!(path = %path.display(), "Ledger restored"),
            Err(e) if e.is_not_found() => {
                let msg = format!(
                    "Backup {}: ledger not found in storage, ignore if this is the first run",
                    self.type_name()
                );
                warn!("{}", msg);
                stats.warnings.push(msg);
            }
            Err(e) => return Err(e.into()),
        }
        Ledger::open(&work_dir.join(file))
    }

    async fn store_ledger<G: StorageGateway>(
        &self,
        storager: &mut Storager<'_, G>,
        ledger: Ledger,
    ) -> Result<u64> {
        ledger.clear_scratch()?;
        let path = ledger.path().to_path_buf();
        let size = ledger.close()?;
        info!(backup = self.type_name(), size = %format_bytes(size), "Ledger closed");

        let suburl = format!("{}/{}", self.dirstorage(), LEDGER_DIR);
        storager.store(&path, &suburl, None).await?;
        Ok(size)
    }
}
