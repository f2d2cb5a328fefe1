//! Per-storage byte counters, kept in their own small database next to
//! the storage target's data.

use super::schema::{open_with_schema, STATS_SCHEMA};
use crate::utils::errors::Result;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Bytes stored on `date` for one category. `category == None` is the
/// total row for that date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStat {
    pub date: String,
    pub category: Option<String>,
    pub bytes: i64,
}

pub struct StatsLedger {
    conn: Connection,
    path: PathBuf,
}

impl StatsLedger {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = open_with_schema(path, STATS_SCHEMA)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add `bytes` to the `(date, category)` counter and to the date total.
    pub fn add(&mut self, date: &str, category: &str, bytes: i64) -> Result<()> {
        let tx = self.conn.transaction()?;
        bump(&tx, date, Some(category), bytes)?;
        bump(&tx, date, None, bytes)?;
        tx.commit()?;
        Ok(())
    }

    pub fn get(&self, date: &str, category: Option<&str>) -> Result<Option<i64>> {
        let bytes = self
            .conn
            .query_row(
                "SELECT size FROM sessions_store WHERE date = ?1 AND category IS ?2",
                params![date, category],
                |row| row.get(0),
            )
            .optional()?;
        Ok(bytes)
    }

    pub fn all(&self) -> Result<Vec<StoreStat>> {
        let mut stmt = self
            .conn
            .prepare("SELECT date, category, size FROM sessions_store ORDER BY date, id")?;
        let rows = stmt.query_map([], |row| {
            Ok(StoreStat {
                date: row.get(0)?,
                category: row.get(1)?,
                bytes: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn close(self) -> Result<u64> {
        self.conn.execute_batch("VACUUM")?;
        let path = self.path;
        self.conn.close().map_err(|(_, e)| e)?;
        Ok(std::fs::metadata(&path)?.len())
    }
}

fn bump(conn: &Connection, date: &str, category: Option<&str>, bytes: i64) -> rusqlite::Result<()> {
    let updated = conn.execute(
        "UPDATE sessions_store SET size = size + ?3 WHERE date = ?1 AND category IS ?2",
        params![date, category, bytes],
    )?;
    if updated == 0 {
        conn.execute(
            "INSERT INTO sessions_store (date, category, size) VALUES (?1, ?2, ?3)",
            params![date, category, bytes],
        )?;
    }
    Ok(())
}
