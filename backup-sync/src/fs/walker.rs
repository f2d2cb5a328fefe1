//! Local tree scanning for incremental backups.

use crate::ledger::FileRecord;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

/// Which parts of a tree to scan.
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Subdirectories (relative to the root) to scan exclusively. When
    /// non-empty, `excludes` is not consulted.
    pub includes: Vec<PathBuf>,

    /// Subdirectories (relative to the root) to skip
    pub excludes: Vec<PathBuf>,
}

/// A regular file found during a scan.
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// Path relative to the scan root, `/`-separated
    pub name: String,

    pub size: u64,

    /// Seconds since the Unix epoch
    pub modified: i64,
}

impl FileInfo {
    /// Build from a walk entry. Symlinks are resolved; links to
    /// directories and broken links yield `None`.
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<Self>> {
        let path = entry.path().to_path_buf();
        let metadata = if entry.path_is_symlink() {
            match std::fs::metadata(&path) {
                Ok(resolved) if resolved.is_file() => resolved,
                _ => return Ok(None),
            }
        } else {
            entry.metadata()?
        };
        if !metadata.is_file() {
            return Ok(None);
        }

        let modified = metadata
            .modified()?
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        Ok(Some(Self {
            name: relative_name(&path, root),
            path,
            size: metadata.len(),
            modified,
        }))
    }

    pub fn to_record(&self) -> FileRecord {
        FileRecord::new(self.name.clone(), self.modified, self.size as i64)
    }
}

fn relative_name(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Hidden names, editor backups and lock files are never backed up.
pub fn is_ignored(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('~') || name.ends_with('~')
}

/// Walk `root` and collect every regular file that passes the include,
/// exclude and ignore rules. Unreadable entries are logged and skipped.
pub fn walk_directory(root: &Path, options: &WalkOptions) -> std::io::Result<Vec<FileInfo>> {
    if !root.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("directory not found: {}", root.display()),
        ));
    }

    let starts: Vec<PathBuf> = if options.includes.is_empty() {
        vec![root.to_path_buf()]
    } else {
        options.includes.iter().map(|i| root.join(i)).collect()
    };
    let excludes: Vec<PathBuf> = if options.includes.is_empty() {
        options.excludes.iter().map(|e| root.join(e)).collect()
    } else {
        Vec::new()
    };

    let mut files = Vec::new();
    for start in starts {
        let walker = WalkDir::new(&start)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !should_skip(e, &excludes));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }
            match FileInfo::from_entry(&entry, root) {
                Ok(Some(info)) => files.push(info),
                Ok(None) => {}
                Err(e) => warn!(path = %entry.path().display(), error = %e, "Skipping file"),
            }
        }
    }

    Ok(files)
}

fn should_skip(entry: &DirEntry, excludes: &[PathBuf]) -> bool {
    // the walk root itself is never filtered by name
    if entry.depth() == 0 {
        return false;
    }
    if is_ignored(&entry.file_name().to_string_lossy()) {
        return true;
    }
    entry.file_type().is_dir() && excludes.iter().any(|e| e == entry.path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn names(files: &[FileInfo]) -> Vec<&str> {
        files.iter().map(|f| f.name.as_str()).collect()
    }

    fn tree() -> std::io::Result<TempDir> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::create_dir_all(root.join("docs/drafts"))?;
        fs::create_dir_all(root.join("cache"))?;
        fs::create_dir_all(root.join(".git"))?;
        fs::write(root.join("a.txt"), b"12345")?;
        fs::write(root.join("docs/b.txt"), b"1234567")?;
        fs::write(root.join("docs/drafts/c.txt"), b"1")?;
        fs::write(root.join("cache/tmp.bin"), b"x")?;
        fs::write(root.join(".git/HEAD"), b"ref")?;
        fs::write(root.join(".hidden"), b"h")?;
        fs::write(root.join("~lock.txt"), b"l")?;
        fs::write(root.join("notes.txt~"), b"n")?;
        Ok(temp_dir)
    }

    #[test]
    fn test_walk_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let files = walk_directory(temp_dir.path(), &WalkOptions::default())?;
        assert!(files.is_empty());
        Ok(())
    }

    #[test]
    fn test_ignore_rules() -> std::io::Result<()> {
        let temp_dir = tree()?;
        let files = walk_directory(temp_dir.path(), &WalkOptions::default())?;

        assert_eq!(
            names(&files),
            vec!["a.txt", "cache/tmp.bin", "docs/b.txt", "docs/drafts/c.txt"]
        );
        assert_eq!(files[0].size, 5);
        assert!(files[0].modified > 0);
        Ok(())
    }

    #[test]
    fn test_excludes_prune_subtrees() -> std::io::Result<()> {
        let temp_dir = tree()?;
        let options = WalkOptions {
            includes: vec![],
            excludes: vec![PathBuf::from("cache"), PathBuf::from("docs/drafts")],
        };

        let files = walk_directory(temp_dir.path(), &options)?;

        assert_eq!(names(&files), vec!["a.txt", "docs/b.txt"]);
        Ok(())
    }

    #[test]
    fn test_includes_win_over_excludes() -> std::io::Result<()> {
        let temp_dir = tree()?;
        let options = WalkOptions {
            includes: vec![PathBuf::from("docs")],
            excludes: vec![PathBuf::from("docs/drafts")],
        };

        let files = walk_directory(temp_dir.path(), &options)?;

        assert_eq!(names(&files), vec!["docs/b.txt", "docs/drafts/c.txt"]);
        Ok(())
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        assert!(walk_directory(&temp_dir.path().join("nope"), &WalkOptions::default()).is_err());
    }

    #[test]
    fn test_to_record() -> std::io::Result<()> {
        let temp_dir = tree()?;
        let files = walk_directory(temp_dir.path(), &WalkOptions::default())?;
        let record = files[1].to_record();

        assert_eq!(record.name, "cache/tmp.bin");
        assert_eq!(record.size, 1);
        Ok(())
    }
}
