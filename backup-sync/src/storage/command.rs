//! Storage gateway backed by an external copy tool (`gsutil` style:
//! `cp <src> <dst>` and `rm <url>`).

use super::StorageGateway;
use crate::utils::errors::GatewayError;
use crate::utils::process::CommandRunner;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const NOT_FOUND_MARKERS: &[&str] = &["No URLs matched", "NotFound", "404", "does not exist"];

#[derive(Debug, Clone)]
pub struct CommandGateway {
    program: PathBuf,
    runner: CommandRunner,
    dry_run: bool,
}

impl CommandGateway {
    pub fn new(tool: &str, tool_dir: Option<&Path>, runner: CommandRunner, dry_run: bool) -> Self {
        let program = match tool_dir {
            Some(dir) => dir.join(tool),
            None => PathBuf::from(tool),
        };
        Self {
            program,
            runner,
            dry_run,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    async fn invoke(&self, args: &[&str]) -> Result<String, GatewayError> {
        if self.dry_run {
            info!(
                command = %format!("{} {}", self.program.display(), args.join(" ")),
                "Dry run, command not executed"
            );
            return Ok(String::new());
        }
        self.runner
            .run(&self.program, args)
            .await
            .map_err(classify_not_found)
    }
}

/// Turn a failed invocation whose output reports a missing object into
/// [`GatewayError::NotFound`].
fn classify_not_found(err: GatewayError) -> GatewayError {
    match err {
        GatewayError::Failed { ref output, .. }
            if NOT_FOUND_MARKERS.iter().any(|m| output.contains(m)) =>
        {
            GatewayError::NotFound(output.trim().to_string())
        }
        other => other,
    }
}

impl StorageGateway for CommandGateway {
    async fn put(&self, local: &Path, url: &str) -> Result<u64, GatewayError> {
        let size = tokio::fs::metadata(local).await?.len();
        let src = local.to_string_lossy().into_owned();
        self.invoke(&["cp", src.as_str(), url]).await?;
        debug!(url, size, "Stored");
        Ok(size)
    }

    async fn get(&self, url: &str, local: &Path) -> Result<(), GatewayError> {
        let dst = local.to_string_lossy().into_owned();
        self.invoke(&["cp", url, dst.as_str()]).await?;
        Ok(())
    }

    async fn delete(&self, url: &str) -> Result<(), GatewayError> {
        self.invoke(&["rm", url]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn runner() -> CommandRunner {
        CommandRunner::new(Duration::from_secs(5), CancellationToken::new())
    }

    #[test]
    fn test_not_found_output_is_classified() {
        let err = classify_not_found(GatewayError::Failed {
            program: "gsutil".into(),
            code: Some(1),
            output: "CommandException: No URLs matched: gs://b/x".into(),
        });
        assert!(err.is_not_found());

        let err = classify_not_found(GatewayError::Failed {
            program: "gsutil".into(),
            code: Some(1),
            output: "AccessDeniedException: 403".into(),
        });
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_tool_dir_prefixes_program() {
        let gw = CommandGateway::new("gsutil", Some(Path::new("/opt/gsutil")), runner(), false);
        assert_eq!(gw.program(), Path::new("/opt/gsutil/gsutil"));
    }

    #[tokio::test]
    async fn test_dry_run_reports_size_without_invoking() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"hello").unwrap();

        let gw = CommandGateway::new("definitely-not-installed", None, runner(), true);

        assert_eq!(gw.put(&file, "gs://b/a.txt").await.unwrap(), 5);
        gw.delete("gs://b/a.txt").await.unwrap();
    }
}
