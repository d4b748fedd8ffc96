//! Target server implementation

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower_http::compression::{predicate::SizeAbove, CompressionLayer};
use tracing::{debug, info};

use crate::cache::ResourceCache;
use crate::resource::Resource;
use crate::tls::{load_acceptor, serve_tls, TlsConfig};

/// Bodies smaller than this are sent uncompressed.
pub const DEFAULT_COMPRESS_MIN_BYTES: u16 = 1024;

/// Configuration for the target server
#[derive(Debug, Clone)]
pub struct TargetConfig {
    /// Directory the resources are read from
    pub root: PathBuf,
    /// Address to listen on; port 0 picks a free port
    pub addr: SocketAddr,
    /// Minimum body size for gzip compression
    pub compress_min_bytes: u16,
    /// Serve HTTPS with these PEM files instead of plain HTTP
    pub tls: Option<TlsConfig>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("res"),
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            compress_min_bytes: DEFAULT_COMPRESS_MIN_BYTES,
            tls: None,
        }
    }
}

struct AppState {
    root: PathBuf,
    cache: ResourceCache,
}

/// A bound, not yet serving, target server.
pub struct TargetServer {
    listener: TcpListener,
    router: Router,
    local_addr: SocketAddr,
    cache: ResourceCache,
    tls: Option<TlsAcceptor>,
}

impl TargetServer {
    /// Bind the listener. The returned server reports the actual address,
    /// which matters when `config.addr` uses port 0.
    pub async fn bind(config: TargetConfig) -> Result<Self> {
        let tls = config.tls.as_ref().map(load_acceptor).transpose()?;
        let cache = ResourceCache::new();
        let router = router(&config, cache.clone());

        let listener = TcpListener::bind(config.addr)
            .await
            .with_context(|| format!("Failed to bind target server to {}", config.addr))?;
        let local_addr = listener.local_addr()?;

        info!(
            addr = %local_addr,
            root = %config.root.display(),
            tls = tls.is_some(),
            "Target server bound"
        );

        Ok(Self {
            listener,
            router,
            local_addr,
            cache,
            tls,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Base URL clients should use, e.g. `http://127.0.0.1:8080` or
    /// `https://127.0.0.1:8443`.
    pub fn base_url(&self) -> String {
        let scheme = if self.tls.is_some() { "https" } else { "http" };
        format!("{scheme}://{}", self.local_addr)
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// Serve requests until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Target server listening on {}", self.base_url());
        match self.tls {
            Some(acceptor) => serve_tls(self.listener, self.router, acceptor, shutdown).await?,
            None => axum::serve(self.listener, self.router)
                .with_graceful_shutdown(shutdown)
                .await
                .context("Target server failed")?,
        }
        info!("Target server stopped");
        Ok(())
    }
}

/// Build the router serving `config.root` through `cache`.
pub fn router(config: &TargetConfig, cache: ResourceCache) -> Router {
    let state = Arc::new(AppState {
        root: config.root.clone(),
        cache,
    });

    let compression =
        CompressionLayer::new().compress_when(SizeAbove::new(config.compress_min_bytes));

    Router::new()
        .fallback(serve_resource)
        .layer(compression)
        .with_state(state)
}

async fn serve_resource(State(state): State<Arc<AppState>>, method: Method, uri: Uri) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response();
    }

    let path = uri.path();
    if let Some(resource) = state.cache.get(path) {
        debug!(path, "cache hit");
        return resource_response(resource);
    }

    match Resource::load(&state.root, path).await {
        Some(resource) => {
            state.cache.insert(path, resource.clone());
            resource_response(resource)
        },
        None => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}

fn resource_response(resource: Resource) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, resource.content_type)],
        resource.data,
    )
        .into_response()
}
