//! Shared HTTP client for virtual users.
//!
//! One pooled [`reqwest::Client`] is built per run and cloned into every
//! virtual user. Response bodies are decompressed before they reach the
//! checks, so `accept-encoding: gzip, deflate, br` never hides a marker.

use reqwest::header::HeaderMap;
use std::time::Duration;
use tracing::warn;
use url::Url;

use crate::loadtest::config::LoadTestConfig;
use crate::loadtest::error::{LoadTestError, RequestError};

/// Status and decoded body of one completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// HTTP client with the per-request timeout and TLS toggle applied.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration, insecure_skip_tls_verify: bool) -> Result<Self, LoadTestError> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if insecure_skip_tls_verify {
            warn!("TLS certificate verification is disabled for this run");
            builder = builder.danger_accept_invalid_certs(true);
        }
        let inner = builder
            .build()
            .map_err(|source| LoadTestError::Client { source })?;
        Ok(Self { inner, timeout })
    }

    /// Build the client described by `config.settings` and `config.target`.
    pub fn from_config(config: &LoadTestConfig) -> Result<Self, LoadTestError> {
        Self::new(
            config.timeout_as_duration(),
            config.target.insecure_skip_tls_verify,
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Issue a GET and read the whole body. The timeout covers both.
    pub async fn get(&self, url: &Url, headers: &HeaderMap) -> Result<HttpResponse, RequestError> {
        let response = self
            .inner
            .get(url.clone())
            .headers(headers.clone())
            .send()
            .await
            .map_err(|e| RequestError::classify_reqwest(&e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| RequestError::classify_reqwest(&e))?;

        Ok(HttpResponse { status, body })
    }
}
