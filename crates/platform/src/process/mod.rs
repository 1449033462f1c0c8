//! Process execution operations

mod host;

pub use host::HostProcess;

use async_trait::async_trait;
use sprig_errors::Error;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

/// Platform-specific command builder
#[derive(Debug, Clone)]
pub struct PlatformCommand {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
    log_file: Option<PathBuf>,
}

impl PlatformCommand {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            current_dir: None,
            env: BTreeMap::new(),
            log_file: None,
        }
    }

    /// Build a command from an argv vector; `None` if it is empty
    #[must_use]
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        let mut cmd = Self::new(program);
        cmd.args(args);
        Some(cmd)
    }

    pub fn arg<S: AsRef<str>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    pub fn current_dir<P: Into<PathBuf>>(&mut self, dir: P) -> &mut Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(&mut self, vars: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.env.insert(k.into(), v.into());
        }
        self
    }

    /// Append stdout and stderr to `path` instead of capturing them
    pub fn log_to<P: Into<PathBuf>>(&mut self, path: P) -> &mut Self {
        self.log_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    #[must_use]
    pub fn get_current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    #[must_use]
    pub fn get_env_vars(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    #[must_use]
    pub fn get_log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    /// Shell-like rendering for logs
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Output from command execution
///
/// `stdout` and `stderr` are empty when the command logged to a file.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    #[must_use]
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }
}

/// Trait for process execution operations
#[async_trait]
pub trait ProcessOperations: Send + Sync {
    /// Execute a command and return the output
    async fn execute_command(&self, cmd: &PlatformCommand) -> Result<CommandOutput, Error>;

    /// Find the path to an executable on `PATH`
    async fn which(&self, program: &str) -> Result<PathBuf, Error>;
}
