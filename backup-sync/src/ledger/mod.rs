//! Persistent per-backup-unit ledger backed by SQLite.
//!
//! A ledger holds the three file sets used by incremental backups
//! (`local`, `known`, `candidates`), the version history used by
//! single-artifact backups, a session stats log and the parameters it was
//! last written with. The file survives across runs by being uploaded to
//! remote storage next to the data it describes.

mod files;
pub(crate) mod schema;
pub mod stats;
mod versions;

use crate::utils::errors::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub use stats::{StatsLedger, StoreStat};

/// One file in the `local`, `known` or `candidates` set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path relative to the backed-up directory; unique within a set
    pub name: String,
    /// Modification time, seconds since the Unix epoch
    pub modified: i64,
    /// Size in bytes
    pub size: i64,
}

impl FileRecord {
    pub fn new(name: impl Into<String>, modified: i64, size: i64) -> Self {
        Self {
            name: name.into(),
            modified,
            size,
        }
    }
}

/// One uploaded snapshot of a single-artifact backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub timestamp: i64,
    pub name: String,
    pub size: i64,
}

impl VersionRecord {
    pub fn new(timestamp: i64, name: impl Into<String>, size: i64) -> Self {
        Self {
            timestamp,
            name: name.into(),
            size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStat {
    pub date: String,
    pub total_bytes: i64,
}

/// Parameters describing what a ledger tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerParams {
    pub dir_local: String,
    pub remote_url: String,
}

pub(crate) fn row_to_file(row: &Row) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        name: row.get("name")?,
        modified: row.get("modified")?,
        size: row.get("size")?,
    })
}

pub struct Ledger {
    conn: Connection,
    path: PathBuf,
}

impl Ledger {
    /// Open an existing ledger or create a fresh one at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let existed = path.exists();
        let conn = schema::open_with_schema(path, schema::LEDGER_SCHEMA)?;
        debug!(path = %path.display(), existed, "Ledger opened");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn update_params(&self, dir_local: &str, remote_url: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO params (id, dir_local, remote_url) VALUES (0, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET dir_local = excluded.dir_local, remote_url = excluded.remote_url",
            params![dir_local, remote_url],
        )?;
        Ok(())
    }

    pub fn params(&self) -> Result<Option<LedgerParams>> {
        let found = self
            .conn
            .query_row(
                "SELECT dir_local, remote_url FROM params WHERE id = 0",
                [],
                |row| {
                    Ok(LedgerParams {
                        dir_local: row.get(0)?,
                        remote_url: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(found)
    }

    /// Append a session stat row (bytes stored on `date`).
    pub fn record_stat(&self, date: &str, total_bytes: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO stats (date, size) VALUES (?1, ?2)",
            params![date, total_bytes],
        )?;
        Ok(())
    }

    pub fn stats(&self) -> Result<Vec<SessionStat>> {
        let mut stmt = self.conn.prepare("SELECT date, size FROM stats ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok(SessionStat {
                date: row.get(0)?,
                total_bytes: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn size_on_disk(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Compact and close the ledger, returning its final size in bytes.
    pub fn close(self) -> Result<u64> {
        self.conn.execute_batch("VACUUM")?;
        let path = self.path;
        self.conn.close().map_err(|(_, e)| e)?;
        Ok(std::fs::metadata(&path)?.len())
    }
}
