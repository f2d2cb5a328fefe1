//! Run results, printable as a human summary or serialized as JSON.

use crate::backup::BackupStats;
use crate::utils::format::{format_bytes, format_duration};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackupOutcome {
    Completed,
    Failed { message: String },
    /// The run-log still marks this unit as running
    Locked,
    /// Ran too recently for its configured frequency
    NotDue,
}

impl BackupOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        BackupOutcome::Failed {
            message: message.into(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, BackupOutcome::Failed { .. })
    }

    fn label(&self) -> &str {
        match self {
            BackupOutcome::Completed => "completed",
            BackupOutcome::Failed { message } => message,
            BackupOutcome::Locked => "skipped, locked",
            BackupOutcome::NotDue => "skipped, not due",
        }
    }
}

/// One backup on one storage.
#[derive(Debug, Clone, Serialize)]
pub struct StorageRun {
    pub storage: String,
    pub outcome: BackupOutcome,
    pub stats: BackupStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    pub name: String,
    pub kind: String,
    pub section: String,
    pub outcome: BackupOutcome,
    pub runs: Vec<StorageRun>,
}

impl BackupReport {
    pub fn new(name: &str, kind: &str, section: &str, outcome: BackupOutcome) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            section: section.to_string(),
            outcome,
            runs: Vec::new(),
        }
    }

    /// Settle the overall outcome from the per-storage runs.
    pub fn finish(&mut self) {
        let failures: Vec<String> = self
            .runs
            .iter()
            .filter_map(|r| match &r.outcome {
                BackupOutcome::Failed { message } => Some(format!("{}: {}", r.storage, message)),
                _ => None,
            })
            .collect();
        self.outcome = if failures.is_empty() {
            BackupOutcome::Completed
        } else {
            BackupOutcome::failed(failures.join("; "))
        };
    }

    pub fn stored_bytes(&self) -> u64 {
        self.runs.iter().map(|r| r.stats.stored_bytes).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DroppedStorage {
    pub storage: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct JobReport {
    pub name: String,
    pub storages: Vec<String>,
    pub dropped_storages: Vec<DroppedStorage>,
    pub backups: Vec<BackupReport>,
    /// storage url -> category -> bytes stored this run
    pub stored: BTreeMap<String, BTreeMap<String, u64>>,
    pub error: Option<String>,
}

impl JobReport {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn total_stored(&self) -> u64 {
        self.stored.values().flat_map(|c| c.values()).sum()
    }

    pub fn backup(&self, name: &str) -> Option<&BackupReport> {
        self.backups.iter().find(|b| b.name == name)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub started_at: String,
    pub elapsed_secs: u64,
    pub dry_run: bool,
    pub jobs: Vec<JobReport>,
}

impl RunReport {
    pub fn total_stored(&self) -> u64 {
        self.jobs.iter().map(|j| j.total_stored()).sum()
    }

    pub fn has_failures(&self) -> bool {
        self.jobs.iter().any(|j| {
            j.error.is_some()
                || !j.dropped_storages.is_empty()
                || j.backups.iter().any(|b| b.outcome.is_failed())
        })
    }

    pub fn job(&self, name: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|j| j.name == name)
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Backup run started {}{}",
            self.started_at,
            if self.dry_run { " (dry run)" } else { "" }
        );

        for job in &self.jobs {
            let _ = writeln!(out, "\nJob {}", job.name);
            if let Some(err) = &job.error {
                let _ = writeln!(out, "  ERROR: {}", err);
            }
            for dropped in &job.dropped_storages {
                let _ = writeln!(out, "  storage {} dropped: {}", dropped.storage, dropped.reason);
            }
            for backup in &job.backups {
                let _ = writeln!(
                    out,
                    "  {} [{}]: {}",
                    backup.name,
                    backup.kind,
                    backup.outcome.label()
                );
                for run in &backup.runs {
                    let _ = writeln!(
                        out,
                        "    {}: {} files, {} stored",
                        run.storage,
                        run.stats.stored_files,
                        format_bytes(run.stats.stored_bytes)
                    );
                    for warning in &run.stats.warnings {
                        let _ = writeln!(out, "      warning: {}", warning);
                    }
                }
            }
            for (storage, categories) in &job.stored {
                for (category, bytes) in categories {
                    let _ = writeln!(out, "  {} {}: {}", storage, category, format_bytes(*bytes));
                }
            }
        }

        let _ = writeln!(
            out,
            "\nTotal stored {} in {}",
            format_bytes(self.total_stored()),
            format_duration(self.elapsed_secs)
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(storage: &str, outcome: BackupOutcome, bytes: u64) -> StorageRun {
        StorageRun {
            storage: storage.into(),
            outcome,
            stats: BackupStats {
                stored_files: 1,
                stored_bytes: bytes,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_finish_collects_storage_failures() {
        let mut report = BackupReport::new(
            "photos",
            "dir_increment",
            "dir_increment:photos",
            BackupOutcome::Completed,
        );
        report.runs.push(run("gs://a/x", BackupOutcome::Completed, 10));
        report.runs.push(run("s3://b/x", BackupOutcome::failed("boom"), 0));

        report.finish();

        assert_eq!(report.outcome, BackupOutcome::failed("s3://b/x: boom"));
        assert_eq!(report.stored_bytes(), 10);
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(BackupOutcome::failed("disk full")).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["message"], "disk full");

        let json = serde_json::to_value(BackupOutcome::NotDue).unwrap();
        assert_eq!(json["status"], "not_due");
    }

    #[test]
    fn test_totals_and_text() {
        let mut job = JobReport::new("web01");
        job.stored
            .entry("gs://a/x".into())
            .or_default()
            .insert("dir_increment".into(), 2048);
        let mut backup = BackupReport::new(
            "photos",
            "dir_increment",
            "dir_increment:photos",
            BackupOutcome::Completed,
        );
        backup.runs.push(run("gs://a/x", BackupOutcome::Completed, 2048));
        job.backups.push(backup);

        let report = RunReport {
            started_at: "2026-10-16 03:00:00".into(),
            elapsed_secs: 65,
            dry_run: false,
            jobs: vec![job],
        };

        assert_eq!(report.total_stored(), 2048);
        assert!(!report.has_failures());
        let text = report.render_text();
        assert!(text.contains("Job web01"));
        assert!(text.contains("photos [dir_increment]: completed"));
        assert!(text.contains("Total stored 2.00 KB in 0:01:05"));
    }
}
