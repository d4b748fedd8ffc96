//! TOML-based load test configuration.
//!
//! A config describes one page load: a batch of GET requests fired
//! together, the headers they carry, and the named checks evaluated
//! against the batch once it completes.
//!
//! # Example TOML
//!
//! ```toml
//! [settings]
//! virtual_users = 1000
//! duration_secs = 30
//! think_time_ms = 4000
//!
//! [target]
//! host = "https://localhost"
//! insecure_skip_tls_verify = true
//!
//! [headers]
//! accept-encoding = "gzip, deflate, br"
//!
//! [[request]]
//! path = "/"
//!
//! [[request]]
//! path = "/styles.css"
//!
//! [[check]]
//! type = "body_contains"
//! name = "Homepage loaded"
//! marker = "hello!"
//! ```
//!
//! The target host can also be given on the command line, which overrides
//! `target.host`.

use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::loadtest::error::LoadTestError;

/// What happens to in-flight iterations when the run stops.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownPolicy {
    /// Let in-flight iterations finish within `grace_period_ms`.
    #[default]
    Graceful,
    /// Drop in-flight iterations as soon as the run stops.
    Abort,
}

/// Global settings for a load test run.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Number of concurrent virtual users.
    pub virtual_users: u32,
    /// Test duration in seconds.
    pub duration_secs: u64,
    /// Pause after each iteration, in milliseconds.
    #[serde(default = "default_think_time")]
    pub think_time_ms: u64,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub shutdown: ShutdownPolicy,
    /// How long graceful shutdown waits for in-flight iterations.
    #[serde(default = "default_grace_period")]
    pub grace_period_ms: u64,
}

fn default_think_time() -> u64 {
    1000
}

fn default_timeout() -> u64 {
    30_000
}

fn default_grace_period() -> u64 {
    5000
}

/// The host under test.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Target {
    /// Scheme and authority, e.g. `https://localhost`. Request paths are
    /// appended to it.
    #[serde(default)]
    pub host: String,
    /// Accept invalid or self-signed TLS certificates.
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

/// One request in the per-iteration batch.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RequestDef {
    #[serde(default = "default_method")]
    pub method: String,
    pub path: String,
    /// Headers for this request only; they override `[headers]` by name.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// A named assertion evaluated once per iteration against the whole batch.
///
/// Uses serde's internally tagged representation via the `type` field.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum CheckDef {
    /// Passes when at least one response body in the batch contains `marker`.
    #[serde(rename = "body_contains")]
    BodyContains { name: String, marker: String },

    /// Passes when every response in the batch has `status`.
    #[serde(rename = "status")]
    Status { name: String, status: u16 },
}

impl CheckDef {
    /// The label results are aggregated under.
    pub fn name(&self) -> &str {
        match self {
            Self::BodyContains { name, .. } | Self::Status { name, .. } => name,
        }
    }
}

/// Top-level load test configuration parsed from TOML.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoadTestConfig {
    pub settings: Settings,
    #[serde(default)]
    pub target: Target,
    /// Headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub request: Vec<RequestDef>,
    #[serde(default)]
    pub check: Vec<CheckDef>,
}

impl LoadTestConfig {
    /// Parse a TOML string and validate the result.
    pub fn from_toml(content: &str) -> Result<Self, LoadTestError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file, then validate it.
    pub fn load(path: &Path) -> Result<Self, LoadTestError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file without validating it, so command-line
    /// overrides can be applied first.
    pub fn read(path: &Path) -> Result<Self, LoadTestError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadTestError::ConfigIo {
            source,
            path: path.display().to_string(),
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Validate run settings only.
    ///
    /// Used when the engine is driven by a scenario that does not come from
    /// this config's requests and checks.
    pub fn validate_settings(&self) -> Result<(), LoadTestError> {
        if self.settings.virtual_users == 0 {
            return Err(LoadTestError::validation(
                "settings.virtual_users must be greater than 0",
            ));
        }
        if self.settings.duration_secs == 0 {
            return Err(LoadTestError::validation(
                "settings.duration_secs must be greater than 0",
            ));
        }
        if self.settings.timeout_ms == 0 {
            return Err(LoadTestError::validation(
                "settings.timeout_ms must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Validate the whole config. Every error here is fatal before any
    /// virtual user starts.
    pub fn validate(&self) -> Result<(), LoadTestError> {
        self.validate_settings()?;
        self.target_url()?;

        if self.request.is_empty() {
            return Err(LoadTestError::validation(
                "Config must contain at least one [[request]]",
            ));
        }
        for (i, request) in self.request.iter().enumerate() {
            if !request.method.eq_ignore_ascii_case("GET") {
                return Err(LoadTestError::validation(format!(
                    "Request {} uses method '{}'; only GET is supported",
                    i + 1,
                    request.method
                )));
            }
            if !request.path.starts_with('/') {
                return Err(LoadTestError::validation(format!(
                    "Request {} path '{}' must start with '/'",
                    i + 1,
                    request.path
                )));
            }
        }

        for (name, value) in self
            .headers
            .iter()
            .chain(self.request.iter().flat_map(|r| r.headers.iter()))
        {
            validate_header(name, value)?;
        }

        if self.check.is_empty() {
            return Err(LoadTestError::validation(
                "Config must contain at least one [[check]]",
            ));
        }
        for (i, check) in self.check.iter().enumerate() {
            if check.name().trim().is_empty() {
                return Err(LoadTestError::validation(format!(
                    "Check {} has an empty name",
                    i + 1
                )));
            }
            match check {
                CheckDef::BodyContains { name, marker } if marker.is_empty() => {
                    return Err(LoadTestError::validation(format!(
                        "Check '{name}' has an empty marker"
                    )));
                },
                CheckDef::Status { name, status } if !(100..=599).contains(status) => {
                    return Err(LoadTestError::validation(format!(
                        "Check '{name}' expects invalid HTTP status {status}"
                    )));
                },
                _ => {},
            }
        }

        Ok(())
    }

    /// Parse `target.host` into a URL, requiring an http(s) scheme and no
    /// query or fragment.
    pub fn target_url(&self) -> Result<Url, LoadTestError> {
        let host = self.target.host.trim();
        if host.is_empty() {
            return Err(LoadTestError::validation(
                "No target host; set target.host or pass a URL",
            ));
        }
        let url = Url::parse(host).map_err(|e| {
            LoadTestError::validation(format!("Invalid target host '{host}': {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(LoadTestError::validation(format!(
                "Target host '{host}' must use http or https"
            )));
        }
        if url.host_str().is_none() {
            return Err(LoadTestError::validation(format!(
                "Target host '{host}' has no host name"
            )));
        }
        // Request paths are appended to the host; a query or fragment would swallow them.
        if url.query().is_some() || url.fragment().is_some() {
            return Err(LoadTestError::validation(format!(
                "Target host '{host}' must not contain a query string or fragment"
            )));
        }
        Ok(url)
    }

    /// Absolute URL for `request`: the target host with the request path
    /// appended.
    pub fn request_url(&self, request: &RequestDef) -> Result<Url, LoadTestError> {
        let base = self.target.host.trim().trim_end_matches('/');
        let joined = format!("{base}{}", request.path);
        Url::parse(&joined)
            .map_err(|e| LoadTestError::validation(format!("Invalid request URL '{joined}': {e}")))
    }

    /// Headers for `request`: `[headers]` overlaid with the request's own,
    /// matched case-insensitively.
    pub fn headers_for(&self, request: &RequestDef) -> BTreeMap<String, String> {
        let mut merged: BTreeMap<String, String> = self
            .headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
            .collect();
        for (name, value) in &request.headers {
            merged.insert(name.to_ascii_lowercase(), value.clone());
        }
        merged
    }

    pub fn timeout_as_duration(&self) -> Duration {
        Duration::from_millis(self.settings.timeout_ms)
    }

    pub fn think_time(&self) -> Duration {
        Duration::from_millis(self.settings.think_time_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.settings.grace_period_ms)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.settings.duration_secs)
    }
}

fn validate_header(name: &str, value: &str) -> Result<(), LoadTestError> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| LoadTestError::validation(format!("Invalid header name '{name}'")))?;
    HeaderValue::from_str(value).map_err(|_| {
        LoadTestError::validation(format!("Invalid value for header '{name}'"))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL_CONFIG: &str = r#"
[settings]
virtual_users = 1000
duration_secs = 30
think_time_ms = 4000

[target]
host = "https://localhost"
insecure_skip_tls_verify = true

[headers]
sec-ch-ua = '"Chromium";v="94", "Google Chrome";v="94", ";Not A Brand";v="99"'
accept-encoding = "gzip, deflate, br"
accept-language = "en-GB,en;q=0.9"

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
"#;

    fn minimal(settings: &str, rest: &str) -> String {
        format!(
            "[settings]\n{settings}\n\n[target]\nhost = \"http://127.0.0.1:8080\"\n\n\
             [[request]]\npath = \"/\"\n\n{rest}"
        )
    }

    const MARKER_CHECK: &str =
        "[[check]]\ntype = \"body_contains\"\nname = \"Homepage loaded\"\nmarker = \"hello!\"\n";

    #[test]
    fn test_parse_full_config() {
        let config = LoadTestConfig::from_toml(FULL_CONFIG).unwrap();
        assert_eq!(config.settings.virtual_users, 1000);
        assert_eq!(config.settings.duration_secs, 30);
        assert_eq!(config.settings.think_time_ms, 4000);
        assert!(config.target.insecure_skip_tls_verify);
        assert_eq!(config.request.len(), 4);
        assert_eq!(config.headers.len(), 3);
        assert_eq!(
            config.check,
            vec![CheckDef::BodyContains {
                name: "Homepage loaded".to_string(),
                marker: "hello!".to_string(),
            }]
        );
    }

    #[test]
    fn test_defaults_applied() {
        let toml = minimal("virtual_users = 2\nduration_secs = 5", MARKER_CHECK);
        let config = LoadTestConfig::from_toml(&toml).unwrap();
        assert_eq!(config.settings.think_time_ms, 1000);
        assert_eq!(config.settings.timeout_ms, 30_000);
        assert_eq!(config.settings.grace_period_ms, 5000);
        assert_eq!(config.settings.shutdown, ShutdownPolicy::Graceful);
        assert!(!config.target.insecure_skip_tls_verify);
        assert_eq!(config.request[0].method, "GET");
    }

    #[test]
    fn test_parse_abort_policy() {
        let toml = minimal(
            "virtual_users = 2\nduration_secs = 5\nshutdown = \"abort\"",
            MARKER_CHECK,
        );
        let config = LoadTestConfig::from_toml(&toml).unwrap();
        assert_eq!(config.settings.shutdown, ShutdownPolicy::Abort);
    }

    #[test]
    fn test_unknown_shutdown_policy_is_parse_error() {
        let toml = minimal(
            "virtual_users = 2\nduration_secs = 5\nshutdown = \"linger\"",
            MARKER_CHECK,
        );
        let result = LoadTestConfig::from_toml(&toml);
        assert!(matches!(result, Err(LoadTestError::ConfigParse { .. })));
    }

    #[test]
    fn test_parse_status_check() {
        let toml = minimal(
            "virtual_users = 1\nduration_secs = 1",
            "[[check]]\ntype = \"status\"\nname = \"ok\"\nstatus = 200\n",
        );
        let config = LoadTestConfig::from_toml(&toml).unwrap();
        assert_eq!(
            config.check[0],
            CheckDef::Status {
                name: "ok".to_string(),
                status: 200
            }
        );
        assert_eq!(config.check[0].name(), "ok");
    }

    #[test]
    fn test_zero_virtual_users_rejected() {
        let toml = minimal("virtual_users = 0\nduration_secs = 5", MARKER_CHECK);
        let result = LoadTestConfig::from_toml(&toml);
        assert!(matches!(
            result,
            Err(LoadTestError::ConfigValidation { ref message }) if message.contains("virtual_users")
        ));
    }

    #[test]
    fn test_zero_duration_rejected() {
        let toml = minimal("virtual_users = 1\nduration_secs = 0", MARKER_CHECK);
        let result = LoadTestConfig::from_toml(&toml);
        assert!(matches!(
            result,
            Err(LoadTestError::ConfigValidation { ref message }) if message.contains("duration_secs")
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let toml = minimal(
            "virtual_users = 1\nduration_secs = 1\ntimeout_ms = 0",
            MARKER_CHECK,
        );
        assert!(matches!(
            LoadTestConfig::from_toml(&toml),
            Err(LoadTestError::ConfigValidation { .. })
        ));
    }

    #[test]
    fn test_missing_host_rejected() {
        let toml = format!(
            "[settings]\nvirtual_users = 1\nduration_secs = 1\n\n[[request]]\npath = \"/\"\n\n{MARKER_CHECK}"
        );
        let result = LoadTestConfig::from_toml(&toml);
        assert!(matches!(
            result,
            Err(LoadTestError::ConfigValidation { ref message }) if message.contains("target host")
        ));
    }

    #[test]
    fn test_non_http_host_rejected() {
        let mut config = LoadTestConfig::from_toml(FULL_CONFIG).unwrap();
        config.target.host = "ftp://localhost".to_string();
        assert!(matches!(
            config.validate(),
            Err(LoadTestError::ConfigValidation { .. })
        ));
    }

    #[test]
    fn test_unparsable_host_rejected() {
        let mut config = LoadTestConfig::from_toml(FULL_CONFIG).unwrap();
        config.target.host = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_host_with_query_rejected() {
        let mut config = LoadTestConfig::from_toml(FULL_CONFIG).unwrap();
        config.target.host = "http://127.0.0.1:8080/?v=1".to_string();
        assert!(matches!(
            config.validate(),
            Err(LoadTestError::ConfigValidation { ref message }) if message.contains("query string")
        ));
    }

    #[test]
    fn test_host_with_fragment_rejected() {
        let mut config = LoadTestConfig::from_toml(FULL_CONFIG).unwrap();
        config.target.host = "https://localhost#top".to_string();
        assert!(matches!(
            config.validate(),
            Err(LoadTestError::ConfigValidation { ref message }) if message.contains("fragment")
        ));
    }

    #[test]
    fn test_validated_host_keeps_request_path() {
        let config = LoadTestConfig::from_toml(FULL_CONFIG).unwrap();
        for request in &config.request {
            let url = config.request_url(request).unwrap();
            assert_eq!(url.path(), request.path);
            assert!(url.query().is_none());
        }
    }

    #[test]
    fn test_no_requests_rejected() {
        let mut config = LoadTestConfig::from_toml(FULL_CONFIG).unwrap();
        config.request.clear();
        assert!(matches!(
            config.validate(),
            Err(LoadTestError::ConfigValidation { ref message }) if message.contains("[[request]]")
        ));
    }

    #[test]
    fn test_no_checks_rejected() {
        let mut config = LoadTestConfig::from_toml(FULL_CONFIG).unwrap();
        config.check.clear();
        assert!(matches!(
            config.validate(),
            Err(LoadTestError::ConfigValidation { ref message }) if message.contains("[[check]]")
        ));
    }

    #[test]
    fn test_post_request_rejected() {
        let mut config = LoadTestConfig::from_toml(FULL_CONFIG).unwrap();
        config.request[1].method = "POST".to_string();
        assert!(matches!(
            config.validate(),
            Err(LoadTestError::ConfigValidation { ref message }) if message.contains("only GET")
        ));
    }

    #[test]
    fn test_lowercase_get_accepted() {
        let mut config = LoadTestConfig::from_toml(FULL_CONFIG).unwrap();
        config.request[0].method = "get".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_relative_path_rejected() {
        let mut config = LoadTestConfig::from_toml(FULL_CONFIG).unwrap();
        config.request[0].path = "styles.css".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_check_name_rejected() {
        let mut config = LoadTestConfig::from_toml(FULL_CONFIG).unwrap();
        config.check[0] = CheckDef::BodyContains {
            name: "  ".to_string(),
            marker: "hello!".to_string(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_marker_rejected() {
        let mut config = LoadTestConfig::from_toml(FULL_CONFIG).unwrap();
        config.check[0] = CheckDef::BodyContains {
            name: "Homepage loaded".to_string(),
            marker: String::new(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_out_of_range_status_rejected() {
        let mut config = LoadTestConfig::from_toml(FULL_CONFIG).unwrap();
        config.check.push(CheckDef::Status {
            name: "ok".to_string(),
            status: 42,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        let mut config = LoadTestConfig::from_toml(FULL_CONFIG).unwrap();
        config
            .headers
            .insert("bad header".to_string(), "x".to_string());
        assert!(matches!(
            config.validate(),
            Err(LoadTestError::ConfigValidation { ref message }) if message.contains("header name")
        ));
    }

    #[test]
    fn test_invalid_request_header_value_rejected() {
        let mut config = LoadTestConfig::from_toml(FULL_CONFIG).unwrap();
        config.request[0]
            .headers
            .insert("x-test".to_string(), "line\nbreak".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_settings_only_validation_ignores_requests() {
        let toml = "[settings]\nvirtual_users = 3\nduration_secs = 1\n";
        let config: LoadTestConfig = toml::from_str(toml).unwrap();
        assert!(config.validate_settings().is_ok());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_request_url_appends_path() {
        let mut config = LoadTestConfig::from_toml(FULL_CONFIG).unwrap();
        config.target.host = "https://localhost/".to_string();
        let url = config.request_url(&config.request[1]).unwrap();
        assert_eq!(url.as_str(), "https://localhost/styles.css");
    }

    #[test]
    fn test_request_url_keeps_host_path_prefix() {
        let mut config = LoadTestConfig::from_toml(FULL_CONFIG).unwrap();
        config.target.host = "http://example.com/app".to_string();
        let url = config.request_url(&config.request[2]).unwrap();
        assert_eq!(url.as_str(), "http://example.com/app/script.js");
    }

    #[test]
    fn test_request_headers_override_globals() {
        let mut config = LoadTestConfig::from_toml(FULL_CONFIG).unwrap();
        config.request[0]
            .headers
            .insert("Accept-Encoding".to_string(), "identity".to_string());

        let merged = config.headers_for(&config.request[0]);
        assert_eq!(merged["accept-encoding"], "identity");
        assert_eq!(merged["accept-language"], "en-GB,en;q=0.9");
        assert_eq!(merged.len(), 3);

        let untouched = config.headers_for(&config.request[1]);
        assert_eq!(untouched["accept-encoding"], "gzip, deflate, br");
    }

    #[test]
    fn test_duration_helpers() {
        let config = LoadTestConfig::from_toml(FULL_CONFIG).unwrap();
        assert_eq!(config.duration(), Duration::from_secs(30));
        assert_eq!(config.think_time(), Duration::from_secs(4));
        assert_eq!(config.timeout_as_duration(), Duration::from_secs(30));
        assert_eq!(config.grace_period(), Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let result = LoadTestConfig::from_toml("[settings\nvirtual_users = ");
        assert!(matches!(result, Err(LoadTestError::ConfigParse { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL_CONFIG.as_bytes()).unwrap();

        let config = LoadTestConfig::load(file.path()).unwrap();
        assert_eq!(config.settings.virtual_users, 1000);
    }

    #[test]
    fn test_read_skips_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[settings]\nvirtual_users = 4\nduration_secs = 1\n")
            .unwrap();

        let config = LoadTestConfig::read(file.path()).unwrap();
        assert_eq!(config.settings.virtual_users, 4);
        assert!(LoadTestConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = LoadTestConfig::load(Path::new("/nonexistent/vuload/loadtest.toml"));
        assert!(matches!(
            result,
            Err(LoadTestError::ConfigIo { ref path, .. }) if path.contains("loadtest.toml")
        ));
    }
}
