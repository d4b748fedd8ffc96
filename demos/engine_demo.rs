//! Run a short load test against an in-process demo target.
//!
//! ```bash
//! cargo run --example engine_demo
//! ```
//!
//! Serves a tiny site from a temporary directory, runs 20 virtual users
//! against it for five seconds, and prints the summary.

use anyhow::Result;
use std::net::SocketAddr;

use vuload::loadtest::config::LoadTestConfig;
use vuload::loadtest::engine::LoadTestEngine;
use vuload::loadtest::summary::render_summary;
use vuload_target::{TargetConfig, TargetServer};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let site = tempfile::tempdir()?;
    std::fs::write(
        site.path().join("index.html"),
        "<html><head><link rel=\"stylesheet\" href=\"/styles.css\"></head>\
         <body><h1>hello!</h1><script src=\"/script.js\"></script></body></html>",
    )?;
    std::fs::write(site.path().join("styles.css"), "h1 { color: teal; }")?;
    std::fs::write(site.path().join("script.js"), "console.log('loaded');")?;
    std::fs::write(site.path().join("favicon.ico"), [0u8, 0, 1, 0])?;

    let server = TargetServer::bind(TargetConfig {
        root: site.path().to_path_buf(),
        addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        ..TargetConfig::default()
    })
    .await?;
    let host = server.base_url();
    let (stop_server, stopped) = tokio::sync::oneshot::channel::<()>();
    let server_handle = tokio::spawn(server.serve(async {
        let _ = stopped.await;
    }));

    let config = LoadTestConfig::from_toml(&format!(
        r#"
[settings]
virtual_users = 20
duration_secs = 5
think_time_ms = 500

[target]
host = "{host}"

[headers]
accept-encoding = "gzip, deflate, br"

[[request]]
path = "/"

[[request]]
path = "/styles.css"

[[request]]
path = "/script.js"

[[request]]
path = "/favicon.ico"

[[check]]
type = "body_contains"
name = "Homepage loaded"
marker = "hello!"

[[check]]
type = "status"
name = "All resources OK"
status = 200
"#
    ))?;

    let engine = LoadTestEngine::new(config).with_progress(true);
    let result = engine.run().await?;
    println!("{}", render_summary(&result, engine.config()));

    let _ = stop_server.send(());
    server_handle.await??;
    Ok(())
}
