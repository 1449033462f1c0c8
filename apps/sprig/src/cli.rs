//! Command line interface definition

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// sprig - build packages from source against one consistent dependency graph
#[derive(Parser)]
#[command(name = "sprig")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Source package manager with a backtracking concretizer")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Log at debug level to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    /// Color output control
    #[arg(long, global = true, value_enum)]
    pub color: Option<ColorArg>,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Install root
    #[arg(long, global = true, env = "SPRIG_ROOT", value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Recipe directory
    #[arg(long, global = true, env = "SPRIG_RECIPES", value_name = "DIR")]
    pub recipes: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ColorArg {
    Always,
    Auto,
    Never,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Parse specs and print their canonical form
    Spec {
        /// Spec strings, e.g. `zlib@1.2 +shared %gcc`
        #[arg(required = true)]
        specs: Vec<String>,
    },

    /// Resolve specs into a concrete dependency graph
    Concretize {
        #[arg(required = true)]
        specs: Vec<String>,

        /// Also write the graph as JSON to this file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Concretize and build packages with their dependencies
    #[command(alias = "i")]
    Install {
        /// Specs to install
        #[arg(required_unless_present = "dag", conflicts_with = "dag")]
        specs: Vec<String>,

        /// Install a graph saved by `concretize --output` instead
        #[arg(long, value_name = "FILE")]
        dag: Option<PathBuf>,

        /// Parallel jobs per build (0=auto)
        #[arg(short, long, env = "SPRIG_JOBS")]
        jobs: Option<usize>,

        /// Packages built at once (0=auto)
        #[arg(short = 'p', long, env = "SPRIG_MAX_PARALLELISM")]
        max_parallelism: Option<usize>,

        /// Stop starting builds after the first failure
        #[arg(long)]
        fail_fast: bool,

        /// Leave a failed build's prefix in place
        #[arg(long)]
        keep_prefix: bool,

        /// Seconds to wait for another process building the same hash
        #[arg(long, env = "SPRIG_LOCK_TIMEOUT", value_name = "SECS")]
        lock_timeout: Option<u64>,
    },

    /// List installed packages
    #[command(alias = "ls")]
    Find {
        /// Narrow by name and version, e.g. `zlib@1.2:`
        spec: Option<String>,
    },
}
