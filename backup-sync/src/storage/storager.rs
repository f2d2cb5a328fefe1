//! One storage target for the duration of a job.
//!
//! Builds URLs under the target's `dirstorage`, counts stored bytes per
//! category, and keeps the target's stats ledger in
//! sync with the copy kept remotely under [`LEDGER_DIR`].

use super::url::{build_url, canonical_dirstorage, Scheme};
use super::StorageGateway;
use crate::config::StorageConfig;
use crate::ledger::StatsLedger;
use crate::utils::errors::{GatewayError, Result, SyncError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, error, warn};

/// Remote subdirectory holding ledger files.
pub const LEDGER_DIR: &str = "_ledger";

const STATS_FILE: &str = "storage_stats.db";

pub struct Storager<'g, G> {
    gateway: &'g G,
    scheme: Scheme,
    bucket: String,
    dirstorage: String,
    date: String,
    temp: TempDir,
    stats: Option<StatsLedger>,
    stored: BTreeMap<String, u64>,
}

impl<'g, G: StorageGateway> Storager<'g, G> {
    /// Validate the target and allocate its scratch directory in `work_dir`.
    pub fn init(
        gateway: &'g G,
        config: &StorageConfig,
        work_dir: &Path,
        date: &str,
    ) -> Result<Self> {
        if config.bucket.trim().is_empty() {
            return Err(SyncError::Config("storage bucket must be provided".into()));
        }
        let dirstorage = canonical_dirstorage(&config.dirstorage).ok_or_else(|| {
            SyncError::Config(format!(
                "storage dirstorage '{}' is empty or climbs above the bucket",
                config.dirstorage
            ))
        })?;

        let temp = tempfile::Builder::new()
            .prefix("storage-")
            .tempdir_in(work_dir)?;

        Ok(Self {
            gateway,
            scheme: config.kind.scheme(),
            bucket: config.bucket.clone(),
            dirstorage,
            date: date.to_string(),
            temp,
            stats: None,
            stored: BTreeMap::new(),
        })
    }

    /// Restore and open the stats ledger. A missing remote copy is expected
    /// on the first run.
    pub async fn execute(&mut self) -> Result<()> {
        let local = self.temp.path().join(STATS_FILE);
        let url = self.url([LEDGER_DIR, STATS_FILE]);
        match self.gateway.get(&url, &local).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn!(
                    url = %url,
                    "Storage stats not found in storage, ignore if this is the first run"
                );
            }
            Err(e) => return Err(e.into()),
        }
        self.stats = Some(StatsLedger::open(&local)?);
        Ok(())
    }

    /// `scheme://bucket/dirstorage/<parts...>`
    pub fn url<'a, I>(&'a self, parts: I) -> String
    where
        I: IntoIterator<Item = &'a str>,
    {
        build_url(
            self.scheme,
            &self.bucket,
            std::iter::once(self.dirstorage.as_str()).chain(parts),
        )
    }

    pub fn root_url(&self) -> String {
        self.url([])
    }

    pub fn temp_dir(&self) -> &Path {
        self.temp.path()
    }

    /// Fresh scratch directory for one backup, removed when dropped.
    pub fn backup_temp_dir(&self) -> std::io::Result<TempDir> {
        tempfile::Builder::new()
            .prefix("backup-")
            .tempdir_in(self.temp.path())
    }

    /// Upload `local` into `suburl`, keeping its file name. Bytes are
    /// counted under `category` when one is given.
    pub async fn store(
        &mut self,
        local: &Path,
        suburl: &str,
        category: Option<&str>,
    ) -> std::result::Result<u64, GatewayError> {
        let file_name = local
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let url = self.url([suburl, file_name.as_str()]);
        let bytes = self.gateway.put(local, &url).await.map_err(|e| {
            error!(src = %local.display(), url = %url, error = %e, "Error storing file");
            e
        })?;
        if let Some(category) = category {
            *self.stored.entry(category.to_string()).or_default() += bytes;
        }
        Ok(bytes)
    }

    /// Download `suburl/filename` into `local_dir`.
    pub async fn restore(
        &self,
        suburl: &str,
        filename: &str,
        local_dir: &Path,
    ) -> std::result::Result<PathBuf, GatewayError> {
        let url = self.url([suburl, filename]);
        let local = local_dir.join(filename);
        self.gateway.get(&url, &local).await?;
        Ok(local)
    }

    pub async fn unstore(
        &self,
        suburl: &str,
        filename: &str,
    ) -> std::result::Result<(), GatewayError> {
        let url = self.url([suburl, filename]);
        self.gateway.delete(&url).await.map_err(|e| {
            error!(url = %url, error = %e, "Error deleting file from storage");
            e
        })
    }

    pub fn stored_bytes(&self) -> &BTreeMap<String, u64> {
        &self.stored
    }

    pub fn total_stored(&self) -> u64 {
        self.stored.values().sum()
    }

    /// Fold this session's counters into the stats ledger, upload it and
    /// release the scratch directory. Returns the per-category byte counts.
    pub async fn cleanup(mut self) -> BTreeMap<String, u64> {
        let stored = std::mem::take(&mut self.stored);

        if let Some(mut stats) = self.stats.take() {
            for (category, bytes) in &stored {
                let bytes = i64::try_from(*bytes).unwrap_or(i64::MAX);
                if let Err(e) = stats.add(&self.date, category, bytes) {
                    error!(category = %category, error = %e, "Error updating storage stats");
                }
            }
            let path = stats.path().to_path_buf();
            match stats.close() {
                Ok(_) => {
                    let url = self.url([LEDGER_DIR, STATS_FILE]);
                    if let Err(e) = self.gateway.put(&path, &url).await {
                        error!(url = %url, error = %e, "Error storing storage stats");
                    }
                }
                Err(e) => error!(error = %e, "Error closing storage stats"),
            }
        }

        debug!(storage = %self.root_url(), "Storage cleaned up");
        stored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageKind;
    use crate::storage::LocalGateway;

    fn local_target(root: &Path) -> StorageConfig {
        StorageConfig {
            kind: StorageKind::Local,
            active: true,
            bucket: root.to_string_lossy().to_string(),
            dirstorage: "hosts/web01".to_string(),
        }
    }

    #[tokio::test]
    async fn test_store_restore_unstore() -> Result<()> {
        let remote = tempfile::TempDir::new()?;
        let work = tempfile::TempDir::new()?;
        let gateway = LocalGateway::new(false);

        let mut storager = Storager::init(
            &gateway,
            &local_target(remote.path()),
            work.path(),
            "2026-10-16",
        )?;
        storager.execute().await?;

        let src = work.path().join("report.txt");
        std::fs::write(&src, b"0123456789")?;

        assert_eq!(storager.store(&src, "docs/2026", Some("dir_increment")).await?, 10);
        assert!(remote.path().join("hosts/web01/docs/2026/report.txt").exists());
        assert_eq!(storager.total_stored(), 10);

        let restore_dir = storager.temp_dir().to_path_buf();
        let restored = storager.restore("docs/2026", "report.txt", &restore_dir).await?;
        assert_eq!(std::fs::read(&restored)?, b"0123456789");

        storager.unstore("docs/2026", "report.txt").await?;
        assert!(!remote.path().join("hosts/web01/docs/2026/report.txt").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_stats_are_uploaded_and_accumulate() -> Result<()> {
        let remote = tempfile::TempDir::new()?;
        let work = tempfile::TempDir::new()?;
        let gateway = LocalGateway::new(false);
        let src = work.path().join("a.bin");
        std::fs::write(&src, vec![0u8; 100])?;

        for _ in 0..2 {
            let mut storager = Storager::init(
                &gateway,
                &local_target(remote.path()),
                work.path(),
                "2026-10-16",
            )?;
            storager.execute().await?;
            storager.store(&src, "", Some("dir_compress")).await?;
            let counts = storager.cleanup().await;
            assert_eq!(counts.get("dir_compress"), Some(&100));
        }

        let stats_path = remote.path().join("hosts/web01/_ledger/storage_stats.db");
        let stats = StatsLedger::open(&stats_path)?;
        assert_eq!(stats.get("2026-10-16", Some("dir_compress"))?, Some(200));
        assert_eq!(stats.get("2026-10-16", None)?, Some(200));
        Ok(())
    }

    #[tokio::test]
    async fn test_scratch_is_removed_on_cleanup() -> Result<()> {
        let remote = tempfile::TempDir::new()?;
        let work = tempfile::TempDir::new()?;
        let gateway = LocalGateway::new(false);

        let mut storager = Storager::init(
            &gateway,
            &local_target(remote.path()),
            work.path(),
            "2026-10-16",
        )?;
        storager.execute().await?;
        let scratch = storager.temp_dir().to_path_buf();
        assert!(scratch.exists());

        storager.cleanup().await;
        assert!(!scratch.exists());
        Ok(())
    }

    #[test]
    fn test_empty_dirstorage_is_rejected() {
        let work = tempfile::TempDir::new().unwrap();
        let gateway = LocalGateway::new(false);
        let mut target = local_target(Path::new("/mnt/backup"));
        target.dirstorage = " ".into();

        assert!(Storager::init(&gateway, &target, work.path(), "2026-10-16").is_err());

        target.dirstorage = "../../etc".into();
        assert!(Storager::init(&gateway, &target, work.path(), "2026-10-16").is_err());
    }

    #[test]
    fn test_urls_are_rooted_at_dirstorage() {
        let work = tempfile::TempDir::new().unwrap();
        let gateway = LocalGateway::new(false);
        let target = local_target(Path::new("/mnt/backup"));
        let storager = Storager::init(&gateway, &target, work.path(), "d").unwrap();

        assert_eq!(storager.root_url(), "file:///mnt/backup/hosts/web01");
        assert_eq!(
            storager.url(["photos", "./2026/../2025", "a.jpg"]),
            "file:///mnt/backup/hosts/web01/photos/2025/a.jpg"
        );
    }
}
