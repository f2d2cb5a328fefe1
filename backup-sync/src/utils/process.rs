//! External process invocation with a hard timeout and cooperative cancellation.
//!
//! Every external tool (storage transfer command, archiver, database dump
//! utility) goes through [`CommandRunner`], so a hung tool can never stall
//! a whole run.

use crate::utils::errors::GatewayError;
use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default upper bound for a single external command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(3600);

/// Runs external commands, killing them on timeout or cancellation.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
    cancel: CancellationToken,
}

impl CommandRunner {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `program` with `args` and return its combined stdout/stderr.
    ///
    /// A non-zero exit status is reported as [`GatewayError::Failed`]
    /// carrying the captured output.
    pub async fn run<P, I, S>(&self, program: P, args: I) -> Result<String, GatewayError>
    where
        P: AsRef<OsStr>,
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program_name = program.as_ref().to_string_lossy().to_string();

        let mut cmd = Command::new(program.as_ref());
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            program = %program_name,
            timeout_secs = self.timeout.as_secs(),
            "Invoking external command"
        );

        let child = cmd.spawn()?;

        // Dropping the wait future drops the child, and kill_on_drop reaps it.
        let output = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Err(GatewayError::Cancelled(program_name));
            }
            result = tokio::time::timeout(self.timeout, child.wait_with_output()) => {
                match result {
                    Ok(output) => output?,
                    Err(_) => {
                        return Err(GatewayError::Timeout {
                            program: program_name,
                            timeout: self.timeout,
                        });
                    }
                }
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(combined)
        } else {
            Err(GatewayError::Failed {
                program: program_name,
                code: output.status.code(),
                output: combined.trim().to_string(),
            })
        }
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT, CancellationToken::new())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_output() {
        let runner = CommandRunner::default();
        let out = runner.run("echo", ["hello"]).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let runner = CommandRunner::default();
        let err = runner.run("sh", ["-c", "echo boom >&2; exit 3"]).await.unwrap_err();
        match err {
            GatewayError::Failed { code, output, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(output, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_hung_command_times_out() {
        let runner = CommandRunner::new(Duration::from_millis(100), CancellationToken::new());
        let err = runner.run("sleep", ["5"]).await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_command() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let runner = CommandRunner::new(Duration::from_secs(30), cancel);
        let err = runner.run("sleep", ["5"]).await.unwrap_err();
        assert!(matches!(err, GatewayError::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let runner = CommandRunner::default();
        let err = runner
            .run("definitely-not-an-installed-tool-xyz", Vec::<String>::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Io(_)));
    }
}
