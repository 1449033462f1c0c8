//! The upward API: concretize, plan, execute, install

use crate::OpsCtx;
use sprig_errors::{Error, SpecError};
use sprig_events::EventEmitter;
use sprig_install::{BuildPlan, ExecuteOptions, ExecutionReport};
use sprig_spec::{ConcreteDag, Spec};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Parse every argument as one abstract spec
///
/// # Errors
///
/// Returns the parse error of the first malformed argument, or
/// [`SpecError::Parse`] when no argument is given.
pub fn parse_specs<S: AsRef<str>>(args: &[S]) -> Result<Vec<Spec>, Error> {
    if args.is_empty() {
        return Err(SpecError::Parse {
            input: String::new(),
            message: "no package specs provided".to_string(),
        }
        .into());
    }
    args.iter()
        .map(|arg| arg.as_ref().parse::<Spec>().map_err(Error::from))
        .collect()
}

/// Resolve abstract specs into one concrete DAG
///
/// # Errors
///
/// Returns the resolver's error when no consistent assignment exists.
pub fn concretize(ctx: &OpsCtx, specs: &[Spec]) -> Result<ConcreteDag, Error> {
    ctx.emit_operation_started("concretize");
    match ctx.resolver().concretize(specs) {
        Ok(dag) => {
            ctx.emit_operation_completed("concretize", true);
            Ok(dag)
        }
        Err(e) => {
            ctx.emit_operation_failed("concretize", e.to_string());
            Err(e)
        }
    }
}

/// Reload a DAG written by `concretize --json`
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read and
/// [`SpecError::MalformedGraph`] if its contents are not a valid DAG.
pub async fn load_dag(path: &Path) -> Result<ConcreteDag, Error> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;
    let dag = ConcreteDag::from_json(&json)?;
    tracing::debug!(path = %path.display(), nodes = dag.len(), "concrete dag loaded");
    Ok(dag)
}

/// Compute the build plan for a concrete DAG
///
/// # Errors
///
/// Returns an error if the store cannot report install state.
pub async fn plan(ctx: &OpsCtx, dag: Arc<ConcreteDag>) -> Result<BuildPlan, Error> {
    ctx.scheduler.plan(dag).await
}

/// Run a plan
///
/// Node failures are reported in the returned [`ExecutionReport`], not as
/// an error.
///
/// # Errors
///
/// Returns an error if the store cannot be initialized.
pub async fn execute(
    ctx: &OpsCtx,
    plan: &BuildPlan,
    options: &ExecuteOptions,
) -> Result<ExecutionReport, Error> {
    ctx.scheduler.execute(plan, options).await
}

/// Concretize, plan and execute in one step
///
/// # Errors
///
/// Returns resolver errors and store initialization errors.
pub async fn install(
    ctx: &OpsCtx,
    specs: &[Spec],
    options: &ExecuteOptions,
) -> Result<ExecutionReport, Error> {
    let started = Instant::now();
    ctx.emit_operation_started("install");

    let dag = Arc::new(concretize(ctx, specs)?);
    let plan = plan(ctx, dag).await?;
    tracing::info!(
        roots = specs.len(),
        nodes = plan.len(),
        to_build = plan.to_build(),
        "installing"
    );

    let report = execute(ctx, &plan, options).await?;
    tracing::info!(
        success = report.is_success(),
        elapsed_ms = started.elapsed().as_millis(),
        "install finished"
    );
    ctx.emit_operation_completed("install", report.is_success());
    Ok(report)
}
