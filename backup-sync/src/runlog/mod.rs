//! Persisted run lock and frequency gate.
//!
//! One INI section per backup unit (`<kind>:<dirstorage>`) plus the
//! reserved [`APP_SECTION`]. Every transition is written to disk before
//! returning, so a crash while a unit is running leaves `running = True`
//! behind for an operator to clear by hand.

pub mod ini;

use crate::storage::canonical_dirstorage;
use crate::utils::errors::{Result, SyncError};
use chrono::{Duration, NaiveDateTime};
use ini::{IniDocument, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

pub const APP_SECTION: &str = "app";

const RUNNING_KEY: &str = "running_bool<bool>";
const LAST_RUN_KEY: &str = "last_run_time<time>";

/// Run-log section for one backup unit, keyed on the canonical dirstorage
/// so equivalent spellings share one lock.
pub fn section_key(kind: &str, dirstorage: &str) -> String {
    let dirstorage =
        canonical_dirstorage(dirstorage).unwrap_or_else(|| dirstorage.trim().to_string());
    format!("{}:{}", kind, dirstorage)
}

#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<IniDocument> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => IniDocument::parse(&text).map_err(|e| {
                SyncError::RunLog(format!("{}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(IniDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, doc: &IniDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("ini.tmp");
        std::fs::write(&tmp, doc.render())?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn is_running(&self, section: &str) -> Result<bool> {
        let doc = self.load()?;
        Ok(matches!(doc.get(section, RUNNING_KEY)?, Some(Value::Bool(true))))
    }

    pub fn last_run_time(&self, section: &str) -> Result<Option<NaiveDateTime>> {
        let doc = self.load()?;
        match doc.get(section, LAST_RUN_KEY)? {
            Some(Value::Time(t)) => Ok(Some(t)),
            _ => Ok(None),
        }
    }

    /// Mark `section` as running and stamp its last run time with `now`.
    /// Returns `false`, leaving the file untouched, if it is already running.
    pub fn try_acquire(&self, section: &str, now: NaiveDateTime) -> Result<bool> {
        let mut doc = self.load()?;
        if matches!(doc.get(section, RUNNING_KEY)?, Some(Value::Bool(true))) {
            return Ok(false);
        }

        doc.set(section, LAST_RUN_KEY, &Value::Time(now));
        doc.set(section, RUNNING_KEY, &Value::Bool(true));
        self.save(&doc)?;
        debug!(section, path = %self.path.display(), "Run lock acquired");
        Ok(true)
    }

    /// Like [`try_acquire`](Self::try_acquire), but hands back a guard that
    /// releases the section when dropped.
    pub fn acquire(&self, section: &str, now: NaiveDateTime) -> Result<Option<RunLockGuard<'_>>> {
        if !self.try_acquire(section, now)? {
            return Ok(None);
        }
        Ok(Some(RunLockGuard {
            log: self,
            section: section.to_string(),
            released: false,
        }))
    }

    pub fn release(&self, section: &str) -> Result<()> {
        let mut doc = self.load()?;
        doc.set(section, RUNNING_KEY, &Value::Bool(false));
        self.save(&doc)?;
        debug!(section, "Run lock released");
        Ok(())
    }

    /// Frequency gate: due when never run, when no period is set, or when
    /// strictly more than `period_minutes` have passed since the last run.
    pub fn due_to_run(
        &self,
        section: &str,
        now: NaiveDateTime,
        period_minutes: Option<u32>,
    ) -> Result<bool> {
        let period = match period_minutes {
            Some(p) if p > 0 => p,
            _ => return Ok(true),
        };
        let Some(last) = self.last_run_time(section)? else {
            return Ok(true);
        };
        Ok(now > last + Duration::minutes(i64::from(period)))
    }
}

/// Releases its section on drop unless already released explicitly.
#[must_use = "dropping the guard releases the run lock immediately"]
pub struct RunLockGuard<'a> {
    log: &'a RunLog,
    section: String,
    released: bool,
}

impl RunLockGuard<'_> {
    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.log.release(&self.section)
    }
}

impl Drop for RunLockGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.log.release(&self.section) {
            error!(
                section = %self.section,
                path = %self.log.path.display(),
                error = %e,
                "Failed to release run lock"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn runlog(dir: &TempDir) -> RunLog {
        RunLog::open(dir.path().join("runlog.ini"))
    }

    #[test]
    fn test_acquire_twice_is_refused() -> Result<()> {
        let dir = TempDir::new()?;
        let log = runlog(&dir);

        assert!(log.try_acquire("x", at(1, 0))?);
        assert!(!log.try_acquire("x", at(1, 5))?);

        log.release("x")?;
        assert!(log.try_acquire("x", at(1, 10))?);
        Ok(())
    }

    #[test]
    fn test_refused_acquire_keeps_last_run_time() -> Result<()> {
        let dir = TempDir::new()?;
        let log = runlog(&dir);

        log.try_acquire("x", at(1, 0))?;
        log.try_acquire("x", at(2, 0))?;

        assert_eq!(log.last_run_time("x")?, Some(at(1, 0)));
        Ok(())
    }

    #[test]
    fn test_state_is_persisted_across_handles() -> Result<()> {
        let dir = TempDir::new()?;
        runlog(&dir).try_acquire("app", at(1, 0))?;

        let reopened = runlog(&dir);
        assert!(reopened.is_running("app")?);
        assert!(!reopened.is_running("other")?);

        let text = std::fs::read_to_string(reopened.path())?;
        assert!(text.contains("[app]"));
        assert!(text.contains("running_bool = True"));
        Ok(())
    }

    #[test]
    fn test_stale_lock_cleared_by_hand() -> Result<()> {
        let dir = TempDir::new()?;
        let log = runlog(&dir);
        log.try_acquire("db_mysql:dumps", at(1, 0))?;

        let edited = std::fs::read_to_string(log.path())?.replace("True", "false");
        std::fs::write(log.path(), edited)?;

        assert!(log.try_acquire("db_mysql:dumps", at(2, 0))?);
        Ok(())
    }

    #[test]
    fn test_due_to_run() -> Result<()> {
        let dir = TempDir::new()?;
        let log = runlog(&dir);

        assert!(log.due_to_run("x", at(1, 0), Some(60))?);

        log.try_acquire("x", at(1, 0))?;
        log.release("x")?;

        assert!(!log.due_to_run("x", at(1, 30), Some(60))?);
        assert!(!log.due_to_run("x", at(2, 0), Some(60))?);
        assert!(log.due_to_run("x", at(2, 1), Some(60))?);
        assert!(log.due_to_run("x", at(1, 30), None)?);
        assert!(log.due_to_run("x", at(1, 30), Some(0))?);
        Ok(())
    }

    #[test]
    fn test_guard_releases_when_work_fails() -> Result<()> {
        let dir = TempDir::new()?;
        let log = runlog(&dir);

        let work = |log: &RunLog| -> Result<()> {
            let _guard = log.acquire("dir_increment:photos", at(1, 0))?;
            Err(SyncError::Command("simulated failure".into()))
        };

        assert!(work(&log).is_err());
        assert!(!log.is_running("dir_increment:photos")?);
        Ok(())
    }

    #[test]
    fn test_guard_explicit_release() -> Result<()> {
        let dir = TempDir::new()?;
        let log = runlog(&dir);

        let guard = log.acquire("app", at(1, 0))?.expect("lock is free");
        assert!(log.acquire("app", at(1, 1))?.is_none());
        assert_eq!(guard.section(), "app");

        guard.release()?;
        assert!(!log.is_running("app")?);
        Ok(())
    }

    #[test]
    fn test_section_key() {
        assert_eq!(section_key("dir_increment", "photos"), "dir_increment:photos");
        assert_eq!(section_key("dir_increment", "./photos/"), "dir_increment:photos");
        assert_eq!(section_key("dir_increment", "x/../photos"), "dir_increment:photos");
    }
}
