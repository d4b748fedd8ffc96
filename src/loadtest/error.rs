//! Error types for the load testing engine.
//!
//! Defines [`LoadTestError`] for failures that stop a run before it starts
//! and [`RequestError`] for transport errors recorded while it runs.

/// Errors that occur during load test configuration parsing, validation,
/// file I/O or client setup. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum LoadTestError {
    /// TOML parse failure -- the config file contains invalid TOML syntax
    /// or does not match the expected schema.
    #[error("Failed to parse config TOML: {source}")]
    ConfigParse {
        #[from]
        source: toml::de::Error,
    },

    /// Semantic validation failure -- the config parsed successfully but
    /// contains invalid values (e.g., zero virtual users, bad host).
    #[error("Config validation error: {message}")]
    ConfigValidation { message: String },

    /// File I/O failure -- the config file could not be read from disk.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigIo {
        source: std::io::Error,
        path: String,
    },

    /// The shared HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {source}")]
    Client { source: reqwest::Error },
}

impl LoadTestError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }
}

/// Transport errors encountered by a single request in a batch.
///
/// Each variant is a distinct category that the run counters tally
/// separately. Non-2xx responses are not errors; they reach the checks.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The request exceeded the configured per-request timeout.
    #[error("Request timed out")]
    Timeout,

    /// Connection-level failure (DNS resolution, TCP connect, TLS handshake).
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// The response started but its body could not be read or decoded.
    #[error("Failed to read response body: {message}")]
    Body { message: String },
}

impl RequestError {
    /// Returns the error category as a static string for counting.
    ///
    /// Categories: `"timeout"`, `"connection"`, `"body"`.
    pub fn error_category(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connection { .. } => "connection",
            Self::Body { .. } => "body",
        }
    }

    /// Classify a [`reqwest::Error`] into the appropriate [`RequestError`] variant.
    pub fn classify_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection {
                message: err.to_string(),
            }
        } else if err.is_body() || err.is_decode() {
            Self::Body {
                message: err.to_string(),
            }
        } else {
            Self::Connection {
                message: err.to_string(),
            }
        }
    }
}
