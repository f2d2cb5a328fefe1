//! `file://` storage: a mounted disk or network share used as the remote.

use super::StorageGateway;
use crate::utils::errors::GatewayError;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct LocalGateway {
    dry_run: bool,
}

impl LocalGateway {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

/// Map a `file:///a/b` URL to `/a/b`.
pub fn url_to_path(url: &str) -> Result<PathBuf, GatewayError> {
    let rest = url.strip_prefix("file://").ok_or_else(|| {
        GatewayError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("not a file:// url: {}", url),
        ))
    })?;
    Ok(PathBuf::from(rest))
}

fn not_found(err: std::io::Error, url: &str) -> GatewayError {
    if err.kind() == std::io::ErrorKind::NotFound {
        GatewayError::NotFound(url.to_string())
    } else {
        GatewayError::Io(err)
    }
}

impl StorageGateway for LocalGateway {
    async fn put(&self, local: &Path, url: &str) -> Result<u64, GatewayError> {
        let dst = url_to_path(url)?;
        if self.dry_run {
            info!(src = %local.display(), dst = %dst.display(), "Dry run, copy skipped");
            return Ok(tokio::fs::metadata(local).await?.len());
        }
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(tokio::fs::copy(local, &dst).await?)
    }

    async fn get(&self, url: &str, local: &Path) -> Result<(), GatewayError> {
        let src = url_to_path(url)?;
        if self.dry_run {
            info!(src = %src.display(), dst = %local.display(), "Dry run, copy skipped");
            return Ok(());
        }
        tokio::fs::copy(&src, local)
            .await
            .map_err(|e| not_found(e, url))?;
        Ok(())
    }

    async fn delete(&self, url: &str) -> Result<(), GatewayError> {
        let path = url_to_path(url)?;
        if self.dry_run {
            info!(path = %path.display(), "Dry run, delete skipped");
            return Ok(());
        }
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| not_found(e, url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::url::{build_url, Scheme};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_get_delete() {
        let remote = TempDir::new().unwrap();
        let local = TempDir::new().unwrap();
        let src = local.path().join("notes.txt");
        std::fs::write(&src, b"twelve bytes").unwrap();

        let gw = LocalGateway::new(false);
        let url = build_url(Scheme::File, remote.path().to_str().unwrap(), ["docs", "notes.txt"]);

        assert_eq!(gw.put(&src, &url).await.unwrap(), 12);
        assert!(remote.path().join("docs/notes.txt").exists());

        let back = local.path().join("back.txt");
        gw.get(&url, &back).await.unwrap();
        assert_eq!(std::fs::read(&back).unwrap(), b"twelve bytes");

        gw.delete(&url).await.unwrap();
        assert!(gw.get(&url, &back).await.unwrap_err().is_not_found());
        assert!(gw.delete(&url).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_dry_run_leaves_remote_untouched() {
        let remote = TempDir::new().unwrap();
        let local = TempDir::new().unwrap();
        let src = local.path().join("a");
        std::fs::write(&src, b"abc").unwrap();

        let gw = LocalGateway::new(true);
        let url = build_url(Scheme::File, remote.path().to_str().unwrap(), ["a"]);

        assert_eq!(gw.put(&src, &url).await.unwrap(), 3);
        assert!(!remote.path().join("a").exists());
    }

    #[test]
    fn test_rejects_other_schemes() {
        assert!(url_to_path("gs://bucket/a").is_err());
        assert_eq!(url_to_path("file:///srv/a").unwrap(), PathBuf::from("/srv/a"));
    }
}
