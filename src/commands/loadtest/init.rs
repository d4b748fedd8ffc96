//! `vuload loadtest init` command implementation.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::{CONFIG_DIR, CONFIG_FILE};

const DEFAULT_HOST: &str = "https://localhost";

/// Execute the `loadtest init` command.
///
/// Creates `.vuload/loadtest.toml` in the current directory.
pub fn execute_init(url: Option<String>, force: bool) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let config_path = write_config(&cwd, url.as_deref(), force)?;

    eprintln!("Created {}", config_path.display());
    eprintln!("Edit the file to customize your load test, then run `vuload loadtest run`.");
    Ok(())
}

/// Write the starter config under `base/.vuload/`, refusing to replace an
/// existing file unless `force` is set.
fn write_config(base: &Path, url: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_dir = base.join(CONFIG_DIR);
    let config_path = config_dir.join(CONFIG_FILE);

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}\n\
             Use `--force` to overwrite.",
            config_path.display()
        );
    }

    let content = generate_default_template(url.unwrap_or(DEFAULT_HOST));

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;
    std::fs::write(&config_path, content)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    Ok(config_path)
}

/// Starter config: a homepage load with its three sub-resources,
/// browser-like headers and a marker check.
fn generate_default_template(host: &str) -> String {
    let host = toml::Value::String(host.to_string());
    format!(
        r##"# Load test configuration for vuload

[settings]
# Number of concurrent virtual users
virtual_users = 1000

# Test duration in seconds
duration_secs = 30

# Pause after each iteration in milliseconds
think_time_ms = 4000

# Per-request timeout in milliseconds
timeout_ms = 30000

# What happens to in-flight iterations when the run stops:
# "graceful" lets them finish within grace_period_ms, "abort" drops them.
shutdown = "graceful"
grace_period_ms = 5000

[target]
host = {host}

# Accept self-signed certificates (local development only)
insecure_skip_tls_verify = true

# Headers sent with every request
[headers]
sec-ch-ua = '"Chromium";v="94", "Google Chrome";v="94", ";Not A Brand";v="99"'
accept-encoding = "gzip, deflate, br"
accept-language = "en-GB,en;q=0.9"

# Requests fired together as one batch per iteration
[[request]]
path = "/"

[[request]]
path = "/styles.css"

[[request]]
path = "/script.js"

[[request]]
path = "/favicon.ico"

# Checks evaluated against the whole batch
[[check]]
type = "body_contains"
name = "Homepage loaded"
marker = "hello!"

# [[check]]
# type = "status"
# name = "All resources OK"
# status = 200
"##
    )
}
