//! Process operations backed by `tokio::process`

use async_trait::async_trait;
use sprig_errors::{BuildError, Error};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::fs::OpenOptions;
use tokio::process::Command;

use super::{CommandOutput, PlatformCommand, ProcessOperations};

/// Runs commands on the local host
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProcess;

impl HostProcess {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn spawn_failed(cmd: &PlatformCommand, message: impl Into<String>) -> Error {
    BuildError::SpawnFailed {
        command: cmd.display(),
        message: message.into(),
    }
    .into()
}

#[async_trait]
impl ProcessOperations for HostProcess {
    async fn execute_command(&self, cmd: &PlatformCommand) -> Result<CommandOutput, Error> {
        let mut command = Command::new(cmd.program());
        // Dropping the future kills the child.
        command
            .args(cmd.get_args())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(dir) = cmd.get_current_dir() {
            command.current_dir(dir);
        }

        for (key, value) in cmd.get_env_vars() {
            command.env(key, value);
        }

        if let Some(log) = cmd.get_log_file() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(log)
                .await
                .map_err(|e| Error::io_with_path(&e, log))?
                .into_std()
                .await;
            let err_file = file
                .try_clone()
                .map_err(|e| Error::io_with_path(&e, log))?;
            command.stdout(file).stderr(err_file);
        }

        tracing::debug!(command = %cmd.display(), "spawning");
        let output = command
            .output()
            .await
            .map_err(|e| spawn_failed(cmd, e.to_string()))?;

        Ok(CommandOutput {
            status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    async fn which(&self, program: &str) -> Result<PathBuf, Error> {
        if program.contains('/') {
            return Ok(PathBuf::from(program));
        }
        let path = std::env::var_os("PATH").unwrap_or_default();
        for dir in std::env::split_paths(&path) {
            let candidate = dir.join(program);
            if tokio::fs::metadata(&candidate)
                .await
                .is_ok_and(|m| m.is_file())
            {
                return Ok(candidate);
            }
        }
        Err(spawn_failed(
            &PlatformCommand::new(program),
            "not found on PATH",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_captures_output() {
        let mut cmd = PlatformCommand::new("sh");
        cmd.arg("-c").arg("echo $GREETING").env("GREETING", "hello");
        let output = HostProcess::new().execute_command(&cmd).await.unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout_text(), "hello");
    }

    #[tokio::test]
    async fn test_execute_logs_to_file() {
        let temp = tempfile::tempdir().unwrap();
        let log = temp.path().join("build.log");
        let mut cmd = PlatformCommand::new("sh");
        cmd.args(["-c", "echo out; echo err >&2"])
            .current_dir(temp.path())
            .log_to(&log);
        let output = HostProcess::new().execute_command(&cmd).await.unwrap();
        assert!(output.status.success());
        assert!(output.stdout.is_empty());
        let text = tokio::fs::read_to_string(&log).await.unwrap();
        assert!(text.contains("out"));
        assert!(text.contains("err"));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let cmd = PlatformCommand::new("sprig-definitely-not-a-program");
        let err = HostProcess::new().execute_command(&cmd).await.unwrap_err();
        assert!(matches!(err, Error::Build(BuildError::SpawnFailed { .. })));
        assert!(HostProcess::new()
            .which("sprig-definitely-not-a-program")
            .await
            .is_err());
    }
}
