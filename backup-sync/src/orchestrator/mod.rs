//! Run sequencing: jobs, then storages, then backups, strictly in order.
//!
//! Failures are contained at the smallest unit that owns them. A storage
//! that cannot be brought up is dropped from its job, a backup failing on
//! one storage still runs on the others, and a job with no usable storage
//! is reported without stopping the jobs after it.

pub mod report;
pub mod validate;

use crate::backup::{BackupContext, BackupKind};
use crate::config::parse::parse_frequency;
use crate::config::{BackupConfig, Config, Job, StorageConfig};
use crate::runlog::{section_key, RunLog, APP_SECTION};
use crate::storage::{build_url, StorageGateway, Storager};
use crate::utils::errors::{Result, SyncError};
use crate::utils::format::format_bytes;
use crate::utils::process::CommandRunner;
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub use report::{BackupOutcome, BackupReport, DroppedStorage, JobReport, RunReport, StorageRun};
pub use validate::check_dirstorage_conflicts;

pub struct Orchestrator<'g, G> {
    gateway: &'g G,
    runner: CommandRunner,
    runlog: RunLog,
    work_dir: PathBuf,
    max_failures: usize,
    dry_run: bool,
}

impl<'g, G: StorageGateway> Orchestrator<'g, G> {
    pub fn new(config: &Config, gateway: &'g G, runner: CommandRunner) -> Self {
        Self {
            gateway,
            runner,
            runlog: RunLog::open(config.runlog_path()),
            work_dir: config.paths.work_dir.clone(),
            max_failures: config.transfer.max_failures,
            dry_run: config.storage.dry_run,
        }
    }

    pub fn runlog(&self) -> &RunLog {
        &self.runlog
    }

    fn temp_root(&self) -> PathBuf {
        self.work_dir.join("tmp")
    }

    fn cancelled(&self) -> bool {
        self.runner.cancel_token().is_cancelled()
    }

    /// Run every job. Only run-level problems (conflicting dirstorage
    /// claims, a held app lock, an unusable work directory) are errors;
    /// everything below that ends up in the report.
    pub async fn run(&self, jobs: &[Job], now: NaiveDateTime) -> Result<RunReport> {
        let started = Instant::now();

        check_dirstorage_conflicts(jobs)?;

        let Some(app_lock) = self.runlog.acquire(APP_SECTION, now)? else {
            warn!(
                section = APP_SECTION,
                runlog = %self.runlog.path().display(),
                "Another run is in progress, or the last one did not finish; clear the running flag if no run is active"
            );
            return Err(SyncError::RunLog(format!(
                "section '{}' is marked running in {}",
                APP_SECTION,
                self.runlog.path().display()
            )));
        };

        let tmp = self.temp_root();
        reset_dir(&tmp)?;

        let mut report = RunReport {
            started_at: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            dry_run: self.dry_run,
            ..Default::default()
        };

        for job in jobs {
            if self.cancelled() {
                warn!("Run cancelled, remaining jobs skipped");
                break;
            }
            report.jobs.push(self.run_job(job, now, &tmp).await);
        }

        report.elapsed_secs = started.elapsed().as_secs();
        app_lock.release()?;

        info!(
            jobs = report.jobs.len(),
            stored = %format_bytes(report.total_stored()),
            "Run finished"
        );
        Ok(report)
    }

    async fn run_job(&self, job: &Job, now: NaiveDateTime, tmp: &Path) -> JobReport {
        let mut report = JobReport::new(&job.name);
        let date = now.format("%Y-%m-%d").to_string();
        info!(job = %job.name, "Job started");

        let mut storagers = Vec::new();
        for config in job.active_storages() {
            let label = build_url(
                config.kind.scheme(),
                &config.bucket,
                [config.dirstorage.as_str()],
            );
            match self.init_storage(config, tmp, &date).await {
                Ok(storager) => {
                    report.storages.push(label);
                    storagers.push(storager);
                }
                Err(e) => {
                    error!(
                        job = %job.name,
                        storage = %label,
                        error = %e,
                        "Storage dropped from job"
                    );
                    report.dropped_storages.push(DroppedStorage {
                        storage: label,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if storagers.is_empty() {
            error!(job = %job.name, "No storage available, job aborted");
            report.error = Some("No storage available, job aborted".to_string());
            return report;
        }

        let ctx = BackupContext {
            now,
            runner: &self.runner,
            max_failures: self.max_failures,
        };

        for backup in job.active_backups() {
            if self.cancelled() {
                warn!(job = %job.name, "Run cancelled, remaining backups skipped");
                break;
            }
            report
                .backups
                .push(self.run_backup(backup, &mut storagers, &ctx).await);
        }

        for storager in storagers {
            let url = storager.root_url();
            let stored = storager.cleanup().await;
            if !stored.is_empty() {
                report.stored.insert(url, stored);
            }
        }

        info!(job = %job.name, stored = %format_bytes(report.total_stored()), "Job finished");
        report
    }

    async fn init_storage(
        &self,
        config: &StorageConfig,
        tmp: &Path,
        date: &str,
    ) -> Result<Storager<'g, G>> {
        let mut storager = Storager::init(self.gateway, config, tmp, date)?;
        storager.execute().await?;
        Ok(storager)
    }

    /// Lock and frequency gates. `Some` means the backup must be skipped.
    fn check_gates(
        &self,
        backup: &BackupConfig,
        section: &str,
        now: NaiveDateTime,
    ) -> Result<Option<BackupOutcome>> {
        if self.runlog.is_running(section)? {
            warn!(
                section,
                runlog = %self.runlog.path().display(),
                "Backup is still marked running, skipping; clear the running flag if no run is active"
            );
            return Ok(Some(BackupOutcome::Locked));
        }

        let period = match &backup.frequency {
            Some(freq) => parse_frequency(freq)?,
            None => None,
        };
        if !self.runlog.due_to_run(section, now, period)? {
            debug!(section, "Backup not due yet");
            return Ok(Some(BackupOutcome::NotDue));
        }
        Ok(None)
    }

    async fn run_backup(
        &self,
        backup: &BackupConfig,
        storagers: &mut [Storager<'g, G>],
        ctx: &BackupContext<'_>,
    ) -> BackupReport {
        let type_name = backup.params.type_name();
        let section = section_key(type_name, &backup.dirstorage);
        let mut report =
            BackupReport::new(&backup.name, type_name, &section, BackupOutcome::Completed);

        let kind = match BackupKind::init(backup) {
            Ok(kind) => kind,
            Err(e) => {
                error!(backup = %backup.name, error = %e, "Invalid backup definition");
                report.outcome = BackupOutcome::failed(e.to_string());
                return report;
            }
        };

        match self.check_gates(backup, &section, ctx.now) {
            Ok(None) => {}
            Ok(Some(skip)) => {
                report.outcome = skip;
                return report;
            }
            Err(e) => {
                error!(backup = %backup.name, error = %e, "Cannot check run-log");
                report.outcome = BackupOutcome::failed(e.to_string());
                return report;
            }
        }

        let guard = match self.runlog.acquire(&section, ctx.now) {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                warn!(
                    section = %section,
                    runlog = %self.runlog.path().display(),
                    "Backup locked by another run, skipping"
                );
                report.outcome = BackupOutcome::Locked;
                return report;
            }
            Err(e) => {
                error!(backup = %backup.name, error = %e, "Cannot acquire run lock");
                report.outcome = BackupOutcome::failed(e.to_string());
                return report;
            }
        };

        info!(backup = %backup.name, section = %section, "Backup started");
        for storager in storagers.iter_mut() {
            report.runs.push(self.run_on_storage(&kind, storager, ctx).await);
        }
        report.finish();

        if let Err(e) = guard.release() {
            error!(section = %section, error = %e, "Run lock not released");
            report.outcome = BackupOutcome::failed(format!("run lock not released: {}", e));
        }
        report
    }

    async fn run_on_storage(
        &self,
        kind: &BackupKind,
        storager: &mut Storager<'g, G>,
        ctx: &BackupContext<'_>,
    ) -> StorageRun {
        let storage = storager.root_url();

        // Removed on drop, including every early return below.
        let scratch = match storager.backup_temp_dir() {
            Ok(dir) => dir,
            Err(e) => {
                return StorageRun {
                    storage,
                    outcome: BackupOutcome::failed(e.to_string()),
                    stats: Default::default(),
                }
            }
        };

        let (stats, failure) = match kind.execute(storager, scratch.path(), ctx).await {
            Ok(execution) => kind.cleanup(execution, storager).await,
            Err(e) => (Default::default(), Some(e)),
        };

        let outcome = match failure {
            None => {
                info!(
                    backup = kind.type_name(),
                    storage = %storage,
                    files = stats.stored_files,
                    stored = %format_bytes(stats.stored_bytes),
                    "Backup completed"
                );
                BackupOutcome::Completed
            }
            Some(e) => {
                error!(
                    backup = kind.type_name(),
                    storage = %storage,
                    files = stats.stored_files,
                    error = %e,
                    "Backup failed"
                );
                BackupOutcome::failed(e.to_string())
            }
        };

        StorageRun {
            storage,
            outcome,
            stats,
        }
    }
}

/// Remove everything under `dir` and recreate it empty.
fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir)?;
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}
