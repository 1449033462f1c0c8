//! Phase execution
//!
//! [`PhaseExecutor`] runs configure, build and install in order for one
//! node. Each phase runs its `before` hooks, the strategy's commands, then
//! its `after` hooks. All output goes to the node's log file; the first
//! non-zero exit ends the build.

use crate::build_systems::{strategy_for, BuildDirs};
use crate::context::BuildRequest;
use async_trait::async_trait;
use sprig_errors::{BuildError, Error};
use sprig_events::{AppEvent, BuildEvent, EventEmitter, EventSender};
use sprig_platform::{HostProcess, PlatformCommand, ProcessOperations};
use sprig_types::{BuildPhase, HookStage};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

/// What a successful build produced
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub prefix: PathBuf,
    pub log_path: PathBuf,
    pub duration: Duration,
}

/// Runs the phases of one node's build
#[async_trait]
pub trait BuildExecutor: Send + Sync {
    /// Build `request` from the tree at `source_dir` into `request.prefix`
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::PhaseFailed`] or [`BuildError::HookFailed`]
    /// for the first failing command, or an I/O error while preparing
    /// directories.
    async fn run_phases(&self, request: &BuildRequest, source_dir: &Path)
        -> Result<BuildReport, Error>;
}

/// [`BuildExecutor`] backed by a [`ProcessOperations`] implementation
#[derive(Debug, Clone, Default)]
pub struct PhaseExecutor<P = HostProcess> {
    process: P,
    event_sender: Option<EventSender>,
}

impl<P> EventEmitter for PhaseExecutor<P> {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

impl PhaseExecutor<HostProcess> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_process(HostProcess::new())
    }
}

impl<P: ProcessOperations> PhaseExecutor<P> {
    #[must_use]
    pub fn with_process(process: P) -> Self {
        Self {
            process,
            event_sender: None,
        }
    }

    #[must_use]
    pub fn with_event_sender(mut self, sender: EventSender) -> Self {
        self.event_sender = Some(sender);
        self
    }

    async fn prepare(&self, request: &BuildRequest, dirs: &BuildDirs) -> Result<(), Error> {
        if dirs.build_dir != dirs.source_dir {
            match fs::remove_dir_all(&dirs.build_dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::io_with_path(&e, &dirs.build_dir)),
            }
        }
        for dir in [&dirs.build_dir, &request.prefix] {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::io_with_path(&e, dir))?;
        }
        if let Some(parent) = request.log_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io_with_path(&e, parent))?;
        }
        Ok(())
    }

    async fn log_line(&self, log_path: &Path, line: &str) -> Result<(), Error> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .await
            .map_err(|e| Error::io_with_path(&e, log_path))?;
        file.write_all(format!("==> {line}\n").as_bytes())
            .await
            .map_err(|e| Error::io_with_path(&e, log_path))?;
        Ok(())
    }

    async fn run_hooks(
        &self,
        request: &BuildRequest,
        dirs: &BuildDirs,
        env: &BTreeMap<String, String>,
        phase: BuildPhase,
        stage: HookStage,
    ) -> Result<(), Error> {
        for argv in request.hooks.get(phase, stage) {
            let Some(mut cmd) = PlatformCommand::from_argv(argv) else {
                return Err(BuildError::HookFailed {
                    hook: String::new(),
                    phase: phase.to_string(),
                    message: "empty hook command".to_string(),
                }
                .into());
            };
            cmd.current_dir(&dirs.build_dir);
            self.emit(AppEvent::Build(BuildEvent::HookRun {
                package: request.node.name.clone(),
                phase: phase.to_string(),
                stage: stage.to_string(),
                command: cmd.display(),
            }));
            if let Err(message) = self.run(request, env, &mut cmd).await? {
                return Err(BuildError::HookFailed {
                    hook: cmd.display(),
                    phase: phase.to_string(),
                    message,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Run one command; the inner error is a failure message for the caller
    async fn run(
        &self,
        request: &BuildRequest,
        env: &BTreeMap<String, String>,
        cmd: &mut PlatformCommand,
    ) -> Result<Result<(), String>, Error> {
        cmd.envs(env.clone()).log_to(&request.log_path);
        self.log_line(&request.log_path, &cmd.display()).await?;
        let output = self.process.execute_command(cmd).await?;
        if output.status.success() {
            return Ok(Ok(()));
        }
        let status = output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |code| code.to_string());
        Ok(Err(format!(
            "`{}` exited with {status}; see {}",
            cmd.display(),
            request.log_path.display()
        )))
    }
}

#[async_trait]
impl<P: ProcessOperations> BuildExecutor for PhaseExecutor<P> {
    async fn run_phases(
        &self,
        request: &BuildRequest,
        source_dir: &Path,
    ) -> Result<BuildReport, Error> {
        let started = Instant::now();
        let node = &request.node;
        let strategy = strategy_for(node.build_system);
        let dirs = strategy.dirs(source_dir, &request.stage_dir);
        self.prepare(request, &dirs).await?;
        self.log_line(
            &request.log_path,
            &format!(
                "building {}@{} /{} with {}",
                node.name,
                node.version,
                node.hash.short(),
                strategy.kind()
            ),
        )
        .await?;

        let env = request.environment();
        for phase in BuildPhase::ALL {
            tracing::debug!(package = %node.name, %phase, "phase started");
            self.emit(AppEvent::Build(BuildEvent::PhaseStarted {
                package: node.name.clone(),
                phase: phase.to_string(),
            }));

            self.run_hooks(request, &dirs, &env, phase, HookStage::Before)
                .await?;
            for mut cmd in strategy.phase_commands(phase, request, &dirs) {
                if let Err(message) = self.run(request, &env, &mut cmd).await? {
                    return Err(BuildError::PhaseFailed {
                        package: node.name.clone(),
                        phase: phase.to_string(),
                        message,
                    }
                    .into());
                }
            }
            self.run_hooks(request, &dirs, &env, phase, HookStage::After)
                .await?;
        }

        Ok(BuildReport {
            prefix: request.prefix.clone(),
            log_path: request.log_path.clone(),
            duration: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_systems::test_support::request;
    use sprig_types::BuildSystemKind;
    use tempfile::tempdir;

    fn staged(kind: BuildSystemKind, root: &Path) -> BuildRequest {
        let mut request = request(kind);
        request.prefix = root.join("prefix");
        request.stage_dir = root.join("stage");
        request.log_path = root.join("logs/demo.log");
        request
    }

    #[tokio::test]
    async fn test_generic_hooks_run_in_phase_order() {
        let temp = tempdir().unwrap();
        let mut request = staged(BuildSystemKind::Generic, temp.path());
        let src = request.stage_dir.join("src");
        fs::create_dir_all(&src).await.unwrap();
        for (phase, word) in [
            (BuildPhase::Install, "install"),
            (BuildPhase::Configure, "configure"),
            (BuildPhase::Build, "build"),
        ] {
            request.hooks.push(
                phase,
                HookStage::Before,
                vec!["sh".into(), "-c".into(), format!("echo {word} >> order.txt")],
            );
        }
        request.hooks.push(
            BuildPhase::Install,
            HookStage::After,
            vec!["sh".into(), "-c".into(), "cp order.txt \"$PREFIX/\"".into()],
        );

        let report = PhaseExecutor::new().run_phases(&request, &src).await.unwrap();
        let order = fs::read_to_string(report.prefix.join("order.txt"))
            .await
            .unwrap();
        assert_eq!(order, "configure\nbuild\ninstall\n");
        let log = fs::read_to_string(&report.log_path).await.unwrap();
        assert!(log.contains("==> building demo@1.0"));
    }

    #[tokio::test]
    async fn test_failing_hook_stops_build() {
        let temp = tempdir().unwrap();
        let mut request = staged(BuildSystemKind::Generic, temp.path());
        let src = request.stage_dir.join("src");
        fs::create_dir_all(&src).await.unwrap();
        request.hooks.push(
            BuildPhase::Build,
            HookStage::Before,
            vec!["sh".into(), "-c".into(), "exit 3".into()],
        );
        request.hooks.push(
            BuildPhase::Install,
            HookStage::Before,
            vec!["touch".into(), "never".into()],
        );

        let err = PhaseExecutor::new()
            .run_phases(&request, &src)
            .await
            .unwrap_err();
        match err {
            Error::Build(BuildError::HookFailed { phase, message, .. }) => {
                assert_eq!(phase, "build");
                assert!(message.contains("exited with 3"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!src.join("never").exists());
    }
}
