//! sprig - source package manager
//!
//! The CLI is a thin layer over the ops crate: it loads configuration,
//! wires an operations context, forwards engine events to tracing and
//! renders the result.

mod cli;
mod display;
mod error;

use crate::cli::{Cli, ColorArg, Commands, GlobalArgs};
use crate::display::OutputRenderer;
use crate::error::CliError;
use clap::Parser;
use sprig_config::{ColorChoice, Config};
use sprig_events::EventReceiver;
use sprig_install::CancellationToken;
use sprig_ops::{InstallReport, OperationResult, OpsCtx};
use sprig_spec::Spec;
use std::process;
use std::sync::Arc;
use tokio::select;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.global.json;

    init_tracing(json_mode, cli.global.debug);

    if let Err(e) = run(cli).await {
        error!("{e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    info!("Starting sprig v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_or_default(cli.global.config.as_deref()).await?;
    config.merge_env()?;
    apply_cli_config(&mut config, &cli.global, &cli.command);

    let renderer = OutputRenderer::new(cli.global.json, config.general.color);

    // Parsing needs no recipes or store
    if let Commands::Spec { specs } = &cli.command {
        let parsed = sprig_ops::parse_specs(specs)?;
        let result = OperationResult::Specs(parsed.iter().map(ToString::to_string).collect());
        renderer.render_result(&result)?;
        return Ok(());
    }

    let (event_sender, event_receiver) = sprig_events::channel();
    let ctx = OpsCtx::load(config, event_sender).await?;

    let result = execute_command_with_events(cli.command, ctx, event_receiver).await?;
    renderer.render_result(&result)?;

    if let OperationResult::InstallReport(report) = &result {
        if !report.success {
            let failed = report
                .nodes
                .iter()
                .filter(|n| !n.status.is_success())
                .count();
            return Err(CliError::InstallFailed { failed });
        }
    }

    info!("Command completed successfully");
    Ok(())
}

/// Run the command while forwarding engine events to tracing
async fn execute_command_with_events(
    command: Commands,
    ctx: OpsCtx,
    mut event_receiver: EventReceiver,
) -> Result<OperationResult, CliError> {
    let mut command_future = Box::pin(execute_command(command, ctx));

    loop {
        select! {
            result = &mut command_future => {
                while let Ok(event) = event_receiver.try_recv() {
                    sprig_events::log_event(&event);
                }
                return result;
            }
            event = event_receiver.recv() => {
                if let Some(event) = event {
                    sprig_events::log_event(&event);
                }
            }
        }
    }
}

async fn execute_command(command: Commands, ctx: OpsCtx) -> Result<OperationResult, CliError> {
    match command {
        Commands::Spec { specs } => {
            let parsed = sprig_ops::parse_specs(&specs)?;
            Ok(OperationResult::Specs(
                parsed.iter().map(ToString::to_string).collect(),
            ))
        }

        Commands::Concretize { specs, output } => {
            let specs = sprig_ops::parse_specs(&specs)?;
            let dag = sprig_ops::concretize(&ctx, &specs)?;
            if let Some(path) = output {
                let json = dag.to_json().map_err(sprig_errors::Error::from)?;
                tokio::fs::write(&path, json).await?;
                info!(path = %path.display(), "concrete dag written");
            }
            Ok(OperationResult::ConcreteDag(Arc::new(dag)))
        }

        Commands::Install { specs, dag, .. } => {
            let dag = match dag {
                Some(path) => sprig_ops::load_dag(&path).await?,
                None => sprig_ops::concretize(&ctx, &sprig_ops::parse_specs(&specs)?)?,
            };

            let cancel = CancellationToken::new();
            let options = ctx.execute_options().with_cancellation(cancel.clone());
            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted; letting running builds finish");
                    cancel.cancel();
                }
            });

            let plan = sprig_ops::plan(&ctx, Arc::new(dag)).await?;
            let report = sprig_ops::execute(&ctx, &plan, &options).await;
            interrupt.abort();
            Ok(OperationResult::InstallReport(InstallReport::from(&report?)))
        }

        Commands::Find { spec } => {
            let query = spec.map(|s| s.parse::<Spec>()).transpose().map_err(sprig_errors::Error::from)?;
            let packages = sprig_ops::find(&ctx, query.as_ref()).await?;
            Ok(OperationResult::PackageList(packages))
        }
    }
}

/// CLI flags override file and environment configuration
fn apply_cli_config(config: &mut Config, global: &GlobalArgs, command: &Commands) {
    if let Some(color) = global.color {
        config.general.color = match color {
            ColorArg::Always => ColorChoice::Always,
            ColorArg::Auto => ColorChoice::Auto,
            ColorArg::Never => ColorChoice::Never,
        };
    }
    if let Some(root) = &global.root {
        config.install.root = Some(root.clone());
    }
    if let Some(recipes) = &global.recipes {
        config.paths.recipes = Some(recipes.clone());
    }

    if let Commands::Install {
        jobs,
        max_parallelism,
        fail_fast,
        keep_prefix,
        lock_timeout,
        ..
    } = command
    {
        if let Some(jobs) = jobs {
            config.general.jobs = *jobs;
        }
        if let Some(max) = max_parallelism {
            config.install.max_parallelism = *max;
        }
        if let Some(secs) = lock_timeout {
            config.install.lock_timeout_secs = *secs;
        }
        config.install.fail_fast |= *fail_fast;
        config.install.keep_prefix |= *keep_prefix;
    }
}

/// Logs go to stderr so stdout carries only results
fn init_tracing(json_mode: bool, debug: bool) {
    let default = if debug {
        "info,sprig=debug,sprig_ops=debug,sprig_install=debug"
    } else if json_mode {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json_mode {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}
