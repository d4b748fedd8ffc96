//! `vuload loadtest` CLI subcommands.
//!
//! Provides `run` (execute a load test) and `init` (generate starter config).

mod init;
mod run;

use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Directory searched for `loadtest.toml`, relative to the working
/// directory or any of its parents.
pub const CONFIG_DIR: &str = ".vuload";
pub const CONFIG_FILE: &str = "loadtest.toml";

/// Load test commands.
#[derive(Debug, Subcommand)]
pub enum LoadtestCommand {
    /// Run a load test against a target host
    ///
    /// Executes the batch and checks defined in .vuload/loadtest.toml
    /// (or a custom config path) and prints a summary of check results.
    Run(RunArgs),

    /// Generate a starter loadtest config file
    ///
    /// Creates .vuload/loadtest.toml describing a homepage load: four
    /// requests with browser-like headers and a "Homepage loaded" check.
    Init {
        /// Target host to write into the config
        url: Option<String>,

        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

/// Options for `loadtest run`. Every value set here overrides the config.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Target host, e.g. https://localhost (overrides target.host)
    #[arg(env = "VULOAD_TARGET")]
    pub url: Option<String>,

    /// Path to config file (default: auto-discover .vuload/loadtest.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of virtual users
    #[arg(long)]
    pub vus: Option<u32>,

    /// Test duration in seconds
    #[arg(long)]
    pub duration: Option<u64>,

    /// Pause between iterations in milliseconds
    #[arg(long)]
    pub think_time: Option<u64>,

    /// Stop after this many iterations across all virtual users
    #[arg(long)]
    pub iterations: Option<u64>,

    /// Accept invalid TLS certificates
    #[arg(long)]
    pub insecure: bool,

    /// Drop in-flight iterations as soon as the run stops
    #[arg(long)]
    pub abort_on_stop: bool,

    /// Disable the live progress line
    #[arg(long)]
    pub no_progress: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Exit with an error when any check failed
    #[arg(long)]
    pub fail_on_check: bool,
}

impl LoadtestCommand {
    /// Execute the selected loadtest subcommand.
    pub fn execute(self) -> Result<()> {
        match self {
            LoadtestCommand::Run(args) => {
                let runtime = tokio::runtime::Runtime::new()?;
                runtime.block_on(run::execute_run(args))
            },
            LoadtestCommand::Init { url, force } => init::execute_init(url, force),
        }
    }
}
