use super::{row_to_file, FileRecord, Ledger};
use crate::sync::diff::select_candidates;
use crate::utils::errors::Result;
use rusqlite::params;
use tracing::{debug, warn};

/// Changed-or-new local files, in scan order.
const DIFF_QUERY: &str = "
SELECT l.name AS name, l.modified AS modified, l.size AS size
FROM local l
LEFT JOIN known k ON k.name = l.name
WHERE k.name IS NULL OR k.modified != l.modified OR k.size != l.size
ORDER BY l.rowid";

impl Ledger {
    /// Empty the `local` and `candidates` sets. `known` is untouched.
    pub fn clear_scratch(&self) -> Result<()> {
        self.conn.execute_batch(
            "DELETE FROM local;
             DELETE FROM candidates;",
        )?;
        Ok(())
    }

    pub fn record_local(&self, record: &FileRecord) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO local (name, modified, size) VALUES (?1, ?2, ?3)",
            params![record.name, record.modified, record.size],
        )?;
        Ok(())
    }

    /// Record a whole scan. A record that fails to insert is logged and
    /// skipped; the number of recorded files is returned.
    pub fn record_locals<'a, I>(&mut self, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a FileRecord>,
    {
        let tx = self.conn.transaction()?;
        let mut recorded = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO local (name, modified, size) VALUES (?1, ?2, ?3)",
            )?;
            for record in records {
                match stmt.execute(params![record.name, record.modified, record.size]) {
                    Ok(_) => recorded += 1,
                    Err(e) => warn!(file = %record.name, error = %e, "Failed to record local file"),
                }
            }
        }
        tx.commit()?;
        Ok(recorded)
    }

    /// Compute new or changed files against `known`, apply the upload
    /// budget and store the result as the `candidates` set.
    pub fn diff_against_known(&mut self, budget: i64) -> Result<Vec<FileRecord>> {
        let changed: Vec<FileRecord> = {
            let mut stmt = self.conn.prepare(DIFF_QUERY)?;
            let rows = stmt.query_map([], |row| row_to_file(row))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        let changed_count = changed.len();
        let selected = select_candidates(changed, budget);

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM candidates", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO candidates (name, modified, size) VALUES (?1, ?2, ?3)",
            )?;
            for record in &selected {
                stmt.execute(params![record.name, record.modified, record.size])?;
            }
        }
        tx.commit()?;

        debug!(
            changed = changed_count,
            selected = selected.len(),
            budget,
            "Diff against known files"
        );
        Ok(selected)
    }

    pub fn candidates(&self) -> Result<Vec<FileRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, modified, size FROM candidates ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| row_to_file(row))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn local_files(&self) -> Result<Vec<FileRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, modified, size FROM local ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| row_to_file(row))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn known(&self) -> Result<Vec<FileRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, modified, size FROM known ORDER BY name")?;
        let rows = stmt.query_map([], |row| row_to_file(row))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Mark `record` as present in storage. Call only after a verified
    /// successful transfer.
    pub fn commit_upload(&self, record: &FileRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO known (name, modified, size) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET modified = excluded.modified, size = excluded.size",
            params![record.name, record.modified, record.size],
        )?;
        Ok(())
    }
}
