//! vuload: virtual-user HTTP load generator
//!
//! Runs batches of page-load requests from many concurrent virtual users,
//! checks every batch, and reports pass/fail counts per check.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

/// Virtual-user HTTP load generator
#[derive(Parser)]
#[command(name = "vuload")]
#[command(about = "Load test a website with concurrent virtual users", long_about = None)]
#[command(version)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run or scaffold load tests
    ///
    /// Load tests are described by a TOML file, by default
    /// .vuload/loadtest.toml in the current directory or a parent.
    Loadtest {
        #[command(subcommand)]
        command: commands::loadtest::LoadtestCommand,
    },

    /// Serve a static site to load test against
    ///
    /// Serves files from a resource directory over HTTP, or HTTPS when a
    /// certificate and key are given, mapping `/` to index.html and
    /// gzipping larger responses.
    Serve(commands::serve::ServeArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Loadtest { command } => command.execute(),
        Commands::Serve(args) => args.execute(),
    }
}

/// Log to stderr so the summary on stdout stays clean.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
