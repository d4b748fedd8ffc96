//! `vuload serve` command implementation.

use anyhow::Result;
use clap::Args;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use vuload_target::{TargetConfig, TargetServer, TlsConfig, DEFAULT_COMPRESS_MIN_BYTES};

/// Options for `vuload serve`.
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Directory to serve files from
    #[arg(long, default_value = "res")]
    pub dir: PathBuf,

    /// Port to listen on
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Address to bind
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub bind: IpAddr,

    /// PEM certificate chain; serves HTTPS when given with --tls-key
    #[arg(long, requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key for --tls-cert
    #[arg(long, requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,
}

impl ServeArgs {
    pub fn execute(self) -> Result<()> {
        if !self.dir.is_dir() {
            anyhow::bail!("Resource directory not found: {}", self.dir.display());
        }

        let tls = match (self.tls_cert, self.tls_key) {
            (Some(cert_path), Some(key_path)) => Some(TlsConfig {
                cert_path,
                key_path,
            }),
            _ => None,
        };
        let config = TargetConfig {
            root: self.dir,
            addr: SocketAddr::new(self.bind, self.port),
            compress_min_bytes: DEFAULT_COMPRESS_MIN_BYTES,
            tls,
        };

        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(async move {
            let server = TargetServer::bind(config).await?;
            eprintln!("Serving on {} (Ctrl+C to stop)", server.base_url());
            server
                .serve(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await
        })
    }
}
