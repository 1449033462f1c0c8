//! Build graph scheduler
//!
//! One coordinator owns the plan state. Ready nodes (every build/link
//! dependency installed) are spawned onto a [`JoinSet`] while a semaphore
//! permit is free; completions release dependents or skip them. Worker
//! tasks only talk to the store, the source provider and the executor.

use crate::options::ExecuteOptions;
use crate::plan::{BuildPlan, PlanAction};
use crate::result::{ExecutionReport, NodeOutcome, NodeStatus};
use sprig_builder::{BuildExecutor, BuildRequest, SourceProvider};
use sprig_config::resources_semaphore::create_semaphore;
use sprig_errors::{Error, StoreError};
use sprig_events::{AppEvent, BuildEvent, EventEmitter, EventSender, FailureContext};
use sprig_index::PackageIndex;
use sprig_spec::{ConcreteDag, NodeId};
use sprig_store::{InstallRecord, InstallStatus, InstallStore};
use sprig_types::DepTypes;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tokio::task::{Id, JoinSet};

/// What a worker reports back to the coordinator
#[derive(Debug)]
enum TaskResult {
    Installed { log_path: PathBuf },
    /// Another process finished the hash while we waited for its lock
    InstalledElsewhere,
    Failed {
        error: Error,
        log_path: Option<PathBuf>,
    },
}

/// Executes build plans against an install store
#[derive(Clone)]
pub struct BuildGraphScheduler {
    store: InstallStore,
    index: Arc<PackageIndex>,
    source: Arc<dyn SourceProvider>,
    executor: Arc<dyn BuildExecutor>,
    event_sender: Option<EventSender>,
}

impl std::fmt::Debug for BuildGraphScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildGraphScheduler")
            .field("root", &self.store.layout().root())
            .finish_non_exhaustive()
    }
}

impl EventEmitter for BuildGraphScheduler {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

impl BuildGraphScheduler {
    #[must_use]
    pub fn new(
        store: InstallStore,
        index: Arc<PackageIndex>,
        source: Arc<dyn SourceProvider>,
        executor: Arc<dyn BuildExecutor>,
    ) -> Self {
        Self {
            store,
            index,
            source,
            executor,
            event_sender: None,
        }
    }

    #[must_use]
    pub fn with_event_sender(mut self, sender: EventSender) -> Self {
        self.event_sender = Some(sender);
        self
    }

    #[must_use]
    pub fn store(&self) -> &InstallStore {
        &self.store
    }

    /// Plan every root of `dag`
    ///
    /// # Errors
    ///
    /// See [`BuildPlan::new`].
    pub async fn plan(&self, dag: Arc<ConcreteDag>) -> Result<BuildPlan, Error> {
        BuildPlan::new(dag, &self.store).await
    }

    /// Run `plan` to completion
    ///
    /// Build failures are reported per node and never abort unrelated
    /// subtrees. The only error returned is a failure to prepare the
    /// store itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the store's metadata directories cannot be
    /// created.
    pub async fn execute(
        &self,
        plan: &BuildPlan,
        options: &ExecuteOptions,
    ) -> Result<ExecutionReport, Error> {
        self.store.init().await?;
        let started = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let dag = plan.dag();
        let layout = self.store.layout();

        self.emit(AppEvent::Build(BuildEvent::PlanReady {
            run_id: run_id.clone(),
            to_build: plan.to_build(),
            already_installed: plan.len() - plan.to_build(),
        }));
        tracing::info!(run_id = %run_id, nodes = plan.len(), to_build = plan.to_build(), "executing build plan");

        let dependents = plan.dependents();
        let mut outcomes: Vec<Option<NodeOutcome>> = vec![None; plan.len()];
        let mut waiting: Vec<usize> = plan
            .nodes()
            .iter()
            .map(|n| {
                n.dependencies
                    .iter()
                    .filter(|dep| plan.nodes()[**dep].action == PlanAction::Build)
                    .count()
            })
            .collect();

        let outcome = |pos: usize, status: NodeStatus| {
            let node = plan.node(pos);
            NodeOutcome {
                hash: node.hash.clone(),
                name: node.name.clone(),
                version: node.version.clone(),
                explicit: plan.nodes()[pos].explicit,
                status,
                prefix: layout.prefix(node),
                log_path: None,
                error: None,
                cause: None,
            }
        };

        let mut ready = VecDeque::new();
        for (pos, planned) in plan.nodes().iter().enumerate() {
            match planned.action {
                PlanAction::AlreadyInstalled => {
                    let done = outcome(pos, NodeStatus::AlreadyInstalled);
                    self.finish_node(&run_id, &done);
                    outcomes[pos] = Some(done);
                }
                PlanAction::Build if waiting[pos] == 0 => ready.push_back(pos),
                PlanAction::Build => {}
            }
        }

        let semaphore = create_semaphore(options.max_parallelism);
        let mut tasks: JoinSet<TaskResult> = JoinSet::new();
        let mut running: HashMap<Id, usize> = HashMap::new();
        let mut stopping = options.cancel.is_cancelled();

        loop {
            while !stopping {
                let Some(&pos) = ready.front() else { break };
                let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                    break;
                };
                ready.pop_front();
                let worker = self.clone();
                let dag = Arc::clone(dag);
                let id = plan.nodes()[pos].id;
                let explicit = plan.nodes()[pos].explicit;
                let run_id = run_id.clone();
                let options = options.clone();
                let handle = tasks.spawn(async move {
                    let result = worker.build_node(&run_id, &dag, id, explicit, &options).await;
                    drop(permit);
                    result
                });
                running.insert(handle.id(), pos);
            }

            if tasks.is_empty() {
                break;
            }

            let joined = tokio::select! {
                () = options.cancel.cancelled(), if !stopping => {
                    tracing::warn!(run_id = %run_id, "cancellation requested; letting running builds finish");
                    stopping = true;
                    continue;
                }
                joined = tasks.join_next_with_id() => joined,
            };
            let Some(joined) = joined else { break };

            let (pos, result) = match joined {
                Ok((task_id, result)) => (running.remove(&task_id), result),
                Err(join_error) => (
                    running.remove(&join_error.id()),
                    TaskResult::Failed {
                        error: Error::internal(format!("build task aborted: {join_error}")),
                        log_path: None,
                    },
                ),
            };
            let Some(pos) = pos else { continue };

            match result {
                TaskResult::Installed { log_path } => {
                    let mut done = outcome(pos, NodeStatus::Installed);
                    done.log_path = Some(log_path);
                    self.finish_node(&run_id, &done);
                    outcomes[pos] = Some(done);
                    release(&dependents[pos], &mut waiting, &outcomes, &mut ready);
                }
                TaskResult::InstalledElsewhere => {
                    let done = outcome(pos, NodeStatus::AlreadyInstalled);
                    self.finish_node(&run_id, &done);
                    outcomes[pos] = Some(done);
                    release(&dependents[pos], &mut waiting, &outcomes, &mut ready);
                }
                TaskResult::Failed { error, log_path } => {
                    let failed_hash = plan.node(pos).hash.clone();
                    let mut done = outcome(pos, NodeStatus::Failed);
                    done.log_path = log_path;
                    done.error = Some(error);
                    self.finish_node(&run_id, &done);
                    outcomes[pos] = Some(done);

                    let mut stack = dependents[pos].clone();
                    while let Some(dependent) = stack.pop() {
                        if outcomes[dependent].is_some() {
                            continue;
                        }
                        let mut skipped = outcome(dependent, NodeStatus::SkippedDueToDependencyFailure);
                        skipped.cause = Some(failed_hash.clone());
                        self.finish_node(&run_id, &skipped);
                        outcomes[dependent] = Some(skipped);
                        stack.extend(dependents[dependent].iter().copied());
                    }
                    ready.retain(|p| outcomes[*p].is_none());

                    if options.fail_fast && !stopping {
                        tracing::warn!(run_id = %run_id, "stopping after first failure");
                        stopping = true;
                    }
                }
            }
        }

        let outcomes: Vec<NodeOutcome> = outcomes
            .into_iter()
            .enumerate()
            .map(|(pos, done)| {
                done.unwrap_or_else(|| {
                    let cancelled = outcome(pos, NodeStatus::Cancelled);
                    self.finish_node(&run_id, &cancelled);
                    cancelled
                })
            })
            .collect();

        let report = ExecutionReport {
            run_id,
            outcomes,
            duration: started.elapsed(),
        };
        self.emit(AppEvent::Build(BuildEvent::ExecutionFinished {
            run_id: report.run_id.clone(),
            installed: report.count(NodeStatus::Installed),
            failed: report.count(NodeStatus::Failed),
            skipped: report.count(NodeStatus::SkippedDueToDependencyFailure),
            cancelled: report.count(NodeStatus::Cancelled),
            duration_ms: u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
        }));
        tracing::info!(
            run_id = %report.run_id,
            installed = report.count(NodeStatus::Installed),
            failed = report.count(NodeStatus::Failed),
            "build plan finished"
        );
        Ok(report)
    }

    fn finish_node(&self, run_id: &str, outcome: &NodeOutcome) {
        match outcome.status {
            NodeStatus::Failed => tracing::error!(
                package = %outcome.name,
                hash = %outcome.hash,
                error = %outcome.error.as_ref().map(ToString::to_string).unwrap_or_default(),
                "build failed"
            ),
            NodeStatus::SkippedDueToDependencyFailure => tracing::warn!(
                package = %outcome.name,
                hash = %outcome.hash,
                "skipped after dependency failure"
            ),
            status => tracing::debug!(package = %outcome.name, hash = %outcome.hash, %status, "node finished"),
        }
        self.emit(AppEvent::Build(BuildEvent::NodeFinished {
            run_id: run_id.to_string(),
            package: outcome.name.clone(),
            hash: outcome.hash.to_hex(),
            outcome: outcome.status.into(),
            log_path: outcome.log_path.clone(),
            failure: outcome.error.as_ref().map(FailureContext::from_error),
        }));
    }

    /// Lock, fetch, build and record one node
    async fn build_node(
        &self,
        run_id: &str,
        dag: &ConcreteDag,
        id: NodeId,
        explicit: bool,
        options: &ExecuteOptions,
    ) -> TaskResult {
        let node = dag.node(id);
        let layout = self.store.layout();

        let lock = match self.store.begin_install(&node.hash, options.lock_timeout).await {
            Ok(lock) => lock,
            Err(e) => {
                return TaskResult::Failed {
                    error: e.into(),
                    log_path: None,
                }
            }
        };

        match self.store.lookup(&node.hash).await {
            Ok(Some(record)) if record.is_installed() => {
                tracing::info!(package = %node.name, hash = %node.hash, "installed by another process");
                return TaskResult::InstalledElsewhere;
            }
            Ok(_) => {}
            Err(StoreError::CorruptRecord { message, .. }) => {
                self.emit_warning_with_context(
                    format!("rebuilding {} over a corrupt install record", node.name),
                    message,
                );
            }
            Err(e) => {
                return TaskResult::Failed {
                    error: e.into(),
                    log_path: None,
                }
            }
        }

        self.emit(AppEvent::Build(BuildEvent::NodeStarted {
            run_id: run_id.to_string(),
            package: node.name.clone(),
            version: node.version.to_string(),
            hash: node.hash.to_hex(),
        }));
        tracing::info!(package = %node.name, version = %node.version, hash = %node.hash.short(), "building");

        let prefix = layout.prefix(node);
        let log_path = layout.log_path(node);
        let record = InstallRecord::new(
            node.hash.clone(),
            &node.name,
            node.version.clone(),
            InstallStatus::InProgress,
            prefix.clone(),
        )
        .with_log_path(log_path.clone())
        .with_explicit(explicit);

        if let Err(e) = self.store.mark_in_progress(&lock, record.clone()).await {
            return TaskResult::Failed {
                error: e.into(),
                log_path: None,
            };
        }

        let stage_dir = layout.stage_dir(node);
        let built = self
            .run_build(dag, id, &prefix, &stage_dir, &log_path, options)
            .await;

        let status = if built.is_ok() {
            InstallStatus::Installed
        } else {
            InstallStatus::Failed
        };
        if built.is_err() && !options.keep_prefix {
            remove_dir_quietly(&prefix).await;
        }
        remove_dir_quietly(&stage_dir).await;

        let recorded = self
            .store
            .record_result(&lock, InstallRecord { status, ..record })
            .await;
        drop(lock);

        match (built, recorded) {
            (Ok(()), Ok(())) => TaskResult::Installed { log_path },
            (Ok(()), Err(e)) => TaskResult::Failed {
                error: e.into(),
                log_path: Some(log_path),
            },
            (Err(error), recorded) => {
                if let Err(e) = recorded {
                    tracing::warn!(package = %node.name, error = %e, "could not record failed build");
                }
                TaskResult::Failed {
                    error,
                    log_path: Some(log_path),
                }
            }
        }
    }

    async fn run_build(
        &self,
        dag: &ConcreteDag,
        id: NodeId,
        prefix: &Path,
        stage_dir: &Path,
        log_path: &Path,
        options: &ExecuteOptions,
    ) -> Result<(), Error> {
        let node = dag.node(id);
        let layout = self.store.layout();

        remove_dir_quietly(stage_dir).await;
        match fs::remove_file(log_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io_with_path(&e, log_path)),
        }

        let source_dir = self
            .source
            .obtain_source(node, &stage_dir.join("src"))
            .await?;

        // Nearest dependencies first
        let dependency_prefixes = dag
            .traverse(id, DepTypes::BUILD_LINK)
            .into_iter()
            .rev()
            .filter(|dep| *dep != id)
            .map(|dep| layout.prefix(dag.node(dep)))
            .collect();

        let mut request = BuildRequest::new(
            node.clone(),
            prefix.to_path_buf(),
            stage_dir.to_path_buf(),
            log_path.to_path_buf(),
        )
        .with_dependency_prefixes(dependency_prefixes)
        .with_jobs(options.build_jobs);
        if let Ok(desc) = self.index.lookup(&node.name) {
            request = request.with_recipe(&desc.build);
        }

        let report = self.executor.run_phases(&request, &source_dir).await?;
        tracing::debug!(
            package = %node.name,
            duration_ms = u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
            "phases complete"
        );
        Ok(())
    }
}

/// Queue dependents whose last pending dependency just installed
fn release(
    dependents: &[usize],
    waiting: &mut [usize],
    outcomes: &[Option<NodeOutcome>],
    ready: &mut VecDeque<usize>,
) {
    for &dependent in dependents {
        waiting[dependent] = waiting[dependent].saturating_sub(1);
        if waiting[dependent] == 0 && outcomes[dependent].is_none() {
            ready.push_back(dependent);
        }
    }
}

async fn remove_dir_quietly(path: &Path) {
    match fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove directory"),
    }
}
