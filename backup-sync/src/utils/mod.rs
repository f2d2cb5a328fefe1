//! Utility modules for the backup synchronizer.

pub mod errors;
pub mod format;
pub mod logger;
pub mod process;
pub mod shutdown;

pub use errors::{Result, SyncError};
