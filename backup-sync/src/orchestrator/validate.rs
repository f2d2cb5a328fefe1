//! Checks that must pass before any backup touches storage.

use crate::config::Job;
use crate::storage::canonical_dirstorage;
use crate::utils::errors::{Result, SyncError};
use std::collections::HashMap;

/// Every active backup must own its dirstorage exclusively, across all
/// loaded jobs. Paths are compared in canonical form. All conflicts are
/// reported at once.
pub fn check_dirstorage_conflicts(jobs: &[Job]) -> Result<()> {
    let mut owners: HashMap<String, (&str, &str)> = HashMap::new();
    let mut conflicts = Vec::new();

    for job in jobs {
        for backup in job.active_backups() {
            let Some(dirstorage) = canonical_dirstorage(&backup.dirstorage) else {
                conflicts.push(format!(
                    "Error in job '{}': storage dir '{}' of backup '{}' is empty or climbs above the bucket",
                    job.name, backup.dirstorage, backup.name
                ));
                continue;
            };
            match owners.get(&dirstorage) {
                Some((owner_job, owner_backup)) => conflicts.push(format!(
                    "Error in job '{}': storage dir '{}' of backup '{}' already used by backup '{}' (job '{}')",
                    job.name, dirstorage, backup.name, owner_backup, owner_job
                )),
                None => {
                    owners.insert(dirstorage, (job.name.as_str(), backup.name.as_str()));
                }
            }
        }
    }

    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(SyncError::Validation(conflicts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobConfig;
    use std::path::PathBuf;

    fn job(name: &str, backups: &[(&str, &str, bool)]) -> Job {
        let mut text = String::from("[identity]\ndir = \"/\"\n");
        for (backup, dirstorage, active) in backups {
            text.push_str(&format!(
                "\n[[backups]]\ntype = \"db_mysql\"\nname = \"{}\"\ndirstorage = \"{}\"\nactive = {}\nhost = \"localhost\"\nhistory = 1\n",
                backup, dirstorage, active
            ));
        }
        let config: JobConfig = toml::from_str(&text).unwrap();
        Job {
            name: name.into(),
            path: PathBuf::from(format!("{}.toml", name)),
            config,
        }
    }

    #[test]
    fn test_unique_dirstorage_passes() {
        let jobs = vec![job("web01", &[("a", "a", true), ("b", "b", true)])];
        assert!(check_dirstorage_conflicts(&jobs).is_ok());
    }

    #[test]
    fn test_duplicate_in_same_job_reports_both_names() {
        let jobs = vec![job("web01", &[("mysql-main", "db", true), ("mysql-copy", "db", true)])];

        let err = check_dirstorage_conflicts(&jobs).unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("mysql-main"));
        assert!(msg.contains("mysql-copy"));
        assert!(msg.contains("'db'"));
    }

    #[test]
    fn test_duplicate_across_jobs_and_trailing_slash() {
        let jobs = vec![
            job("web01", &[("a", "shared/", true)]),
            job("web02", &[("b", "/shared", true)]),
        ];

        match check_dirstorage_conflicts(&jobs) {
            Err(SyncError::Validation(conflicts)) => {
                assert_eq!(conflicts.len(), 1);
                assert!(conflicts[0].contains("job 'web02'"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_equivalent_spellings_conflict() {
        let jobs = vec![job(
            "web01",
            &[("a", "docs", true), ("b", "./docs", true), ("c", "x/../docs", true)],
        )];

        match check_dirstorage_conflicts(&jobs) {
            Err(SyncError::Validation(conflicts)) => {
                assert_eq!(conflicts.len(), 2);
                assert!(conflicts.iter().all(|c| c.contains("'docs'") && c.contains("backup 'a'")));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_dirstorage_outside_bucket_is_rejected() {
        let jobs = vec![job("web01", &[("a", "../../etc", true), ("b", "x/..", true)])];

        match check_dirstorage_conflicts(&jobs) {
            Err(SyncError::Validation(conflicts)) => {
                assert_eq!(conflicts.len(), 2);
                assert!(conflicts[0].contains("'../../etc'"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_inactive_backups_do_not_conflict() {
        let jobs = vec![job("web01", &[("a", "x", true), ("b", "x", false)])];
        assert!(check_dirstorage_conflicts(&jobs).is_ok());
    }
}
