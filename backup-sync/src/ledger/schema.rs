use rusqlite::Connection;

/// Per-backup-unit ledger: three file sets, version history, session stats
/// and the parameters the ledger was last written with.
pub(crate) const LEDGER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS known (
  name TEXT NOT NULL UNIQUE,
  modified INTEGER NOT NULL,
  size INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS local (
  name TEXT NOT NULL UNIQUE,
  modified INTEGER NOT NULL,
  size INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS candidates (
  name TEXT NOT NULL UNIQUE,
  modified INTEGER NOT NULL,
  size INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS versions (
  id INTEGER PRIMARY KEY,
  timestamp INTEGER NOT NULL UNIQUE,
  name TEXT NOT NULL,
  size INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS stats (
  date TEXT NOT NULL,
  size INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS params (
  id INTEGER PRIMARY KEY,
  dir_local TEXT NOT NULL,
  remote_url TEXT NOT NULL
);
"#;

/// Per-storage-target byte counters. A NULL category holds the session total.
pub(crate) const STATS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions_store (
  id INTEGER PRIMARY KEY,
  date TEXT NOT NULL,
  category TEXT,
  size INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_store_date ON sessions_store(date);
"#;

/// Open `path` (creating it if absent) and apply `schema`.
///
/// The ledger file is shipped to remote storage as a single object, so the
/// rollback journal is used instead of WAL.
pub(crate) fn open_with_schema(
    path: &std::path::Path,
    schema: &str,
) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = DELETE;
         PRAGMA synchronous = FULL;",
    )?;
    conn.execute_batch(schema)?;
    Ok(conn)
}
