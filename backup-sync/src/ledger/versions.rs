use super::{Ledger, VersionRecord};
use crate::sync::retention::versions_to_prune;
use crate::utils::errors::Result;
use rusqlite::params;
use tracing::debug;

impl Ledger {
    /// Record an uploaded snapshot. A second version with the same
    /// timestamp replaces the first.
    pub fn add_version(&self, version: &VersionRecord) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO versions (timestamp, name, size) VALUES (?1, ?2, ?3)",
            params![version.timestamp, version.name, version.size],
        )?;
        Ok(())
    }

    /// All versions, newest first.
    pub fn versions(&self) -> Result<Vec<VersionRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT timestamp, name, size FROM versions ORDER BY timestamp DESC")?;
        let rows = stmt.query_map([], |row| {
            Ok(VersionRecord {
                timestamp: row.get(0)?,
                name: row.get(1)?,
                size: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Drop every version beyond the `keep + 1` newest and return the
    /// artifact names removed. Either all of them are removed or none.
    pub fn prune_older_than(&mut self, keep: i64) -> Result<Vec<String>> {
        if keep < 0 {
            return Ok(Vec::new());
        }

        let versions = self.versions()?;
        let pruned = versions_to_prune(&versions, keep);
        if pruned.is_empty() {
            return Ok(Vec::new());
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM versions WHERE timestamp = ?1")?;
            for version in pruned {
                stmt.execute(params![version.timestamp])?;
            }
        }
        tx.commit()?;

        debug!(keep, pruned = pruned.len(), "Pruned old versions");
        Ok(pruned.iter().map(|v| v.name.clone()).collect())
    }
}
