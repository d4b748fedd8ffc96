//! `vuload loadtest run` command implementation.

use anyhow::Result;
use std::io::IsTerminal;
use std::path::PathBuf;

use vuload::loadtest::config::{LoadTestConfig, ShutdownPolicy};
use vuload::loadtest::engine::LoadTestEngine;
use vuload::loadtest::summary::render_summary;

use super::{RunArgs, CONFIG_DIR, CONFIG_FILE};

/// Execute the `loadtest run` command.
///
/// Loads config (via explicit path or auto-discovery), applies CLI overrides,
/// builds and runs the load test engine, and prints the summary.
pub async fn execute_run(args: RunArgs) -> Result<()> {
    // Step 1: Load config
    let config_file = match &args.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: {}\nUse `vuload loadtest init` to create one.",
                    path.display()
                );
            }
            path.clone()
        },
        None => match discover_config() {
            Some(path) => path,
            None => {
                anyhow::bail!(
                    "No loadtest config found.\n\
                     Run `vuload loadtest init` to create {CONFIG_DIR}/{CONFIG_FILE},\n\
                     or use `--config path/to/file.toml` to specify one."
                );
            },
        },
    };

    eprintln!("Loading config from: {}", config_file.display());

    let mut config = LoadTestConfig::read(&config_file)
        .map_err(|e| anyhow::anyhow!("Failed to load config '{}': {}", config_file.display(), e))?;

    // Step 2: Apply CLI overrides, then validate the merged result
    apply_overrides(&mut config, &args);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", config_file.display(), e))?;

    // Step 3: Build and run the engine
    let show_progress = !args.no_progress && std::io::stderr().is_terminal();
    let mut engine = LoadTestEngine::new(config)
        .with_progress(show_progress)
        .with_no_color(args.no_color);
    if let Some(n) = args.iterations {
        engine = engine.with_iterations(n);
    }

    let result = engine
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Load test failed: {}", e))?;

    // Step 4: Output k6-style terminal summary
    if args.no_color || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }
    println!("{}", render_summary(&result, engine.config()));

    if args.fail_on_check && result.checks.fails() > 0 {
        anyhow::bail!(
            "{} of {} checks failed",
            result.checks.fails(),
            result.checks.total()
        );
    }

    Ok(())
}

/// Apply CLI flag overrides to a loaded config.
fn apply_overrides(config: &mut LoadTestConfig, args: &RunArgs) {
    if let Some(url) = &args.url {
        config.target.host = url.clone();
    }
    if let Some(v) = args.vus {
        config.settings.virtual_users = v;
    }
    if let Some(d) = args.duration {
        config.settings.duration_secs = d;
    }
    if let Some(t) = args.think_time {
        config.settings.think_time_ms = t;
    }
    if args.insecure {
        config.target.insecure_skip_tls_verify = true;
    }
    if args.abort_on_stop {
        config.settings.shutdown = ShutdownPolicy::Abort;
    }
}

/// Discover `.vuload/loadtest.toml` by walking parent directories.
///
/// Starts from the current working directory and walks up until either
/// the file is found or the filesystem root is reached.
fn discover_config() -> Option<PathBuf> {
    discover_config_from(std::env::current_dir().ok()?)
}

fn discover_config_from(mut dir: PathBuf) -> Option<PathBuf> {
    loop {
        let candidate = dir.join(CONFIG_DIR).join(CONFIG_FILE);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}
