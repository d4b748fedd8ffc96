//! Demo target for vuload.
//!
//! A small static-file server that stands in for the site a load test
//! exercises: it serves a resource directory, maps `/` to `index.html`,
//! gzips larger bodies and keeps loaded files in memory. Given a
//! certificate and key it serves HTTPS instead of plain HTTP.
//!
//! # Usage
//!
//! ```bash
//! vuload serve --dir res --port 8080
//! vuload loadtest run http://127.0.0.1:8080
//!
//! vuload serve --dir res --port 8443 --tls-cert cert.pem --tls-key key.pem
//! vuload loadtest run https://127.0.0.1:8443 --insecure
//! ```

mod cache;
mod resource;
mod server;
mod tls;

pub use cache::ResourceCache;
pub use resource::{resolve_request_path, Resource, ResourceKind, INDEX_FILE};
pub use server::{router, TargetConfig, TargetServer, DEFAULT_COMPRESS_MIN_BYTES};
pub use tls::TlsConfig;
