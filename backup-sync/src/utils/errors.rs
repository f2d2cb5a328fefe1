//! Custom error types for the backup synchronizer.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Ledger error: {0}")]
    Ledger(#[from] rusqlite::Error),

    #[error("Run-log error: {0}")]
    RunLog(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] GatewayError),

    #[error("Transfer aborted after {failures} failures")]
    TransferBudget { failures: usize },

    #[error("{failed} file transfers failed")]
    Transfer { failed: usize },

    #[error("External command error: {0}")]
    Command(String),
}

/// Errors reported by a storage gateway or an external tool invocation.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{program} failed (exit {code:?}): {output}")]
    Failed {
        program: String,
        code: Option<i32>,
        output: String,
    },

    #[error("{program} timed out after {}s", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("{0} cancelled")]
    Cancelled(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
