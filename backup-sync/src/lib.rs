//! Backup Sync Library
//!
//! Incremental backup synchronizer: per-unit SQLite ledgers, budgeted
//! change uploads, versioned archives with retention, and run locks kept
//! in an INI run-log.

pub mod backup;
pub mod config;
pub mod fs;
pub mod ledger;
pub mod orchestrator;
pub mod runlog;
pub mod storage;
pub mod sync;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use orchestrator::{Orchestrator, RunReport};
pub use utils::errors::SyncError;
pub type Result<T> = std::result::Result<T, SyncError>;
