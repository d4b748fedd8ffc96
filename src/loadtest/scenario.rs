//! Scenarios: the unit of work a virtual user repeats.
//!
//! [`HttpBatchScenario`] fires every configured request at once, waits for
//! all of them, then evaluates each check against the completed batch.

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;
use url::Url;

use crate::loadtest::checks::CheckResult;
use crate::loadtest::client::{HttpClient, HttpResponse};
use crate::loadtest::config::{CheckDef, LoadTestConfig};
use crate::loadtest::error::{LoadTestError, RequestError};

/// Everything one iteration produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationOutcome {
    pub checks: Vec<CheckResult>,
    /// Requests issued, including failed ones.
    pub requests: u64,
    /// Transport errors, one per failed request.
    pub errors: Vec<RequestError>,
}

impl IterationOutcome {
    pub fn failed_requests(&self) -> u64 {
        self.errors.len() as u64
    }
}

/// A unit of work executed repeatedly by each virtual user.
///
/// Implementations hold no per-iteration state; the same instance is shared
/// by every virtual user of a run. A panic inside `run_iteration` fails every
/// registered check for that iteration and the virtual user carries on.
#[async_trait]
pub trait Scenario: Send + Sync {
    async fn run_iteration(&self, vu_id: u32) -> IterationOutcome;
}

#[derive(Debug, Clone)]
struct PreparedRequest {
    url: Url,
    headers: HeaderMap,
}

/// The configured page load: a concurrent batch of GETs plus checks.
#[derive(Debug, Clone)]
pub struct HttpBatchScenario {
    client: HttpClient,
    requests: Vec<PreparedRequest>,
    checks: Vec<CheckDef>,
}

impl HttpBatchScenario {
    /// Resolve URLs and headers once so iterations only clone them.
    pub fn from_config(config: &LoadTestConfig, client: HttpClient) -> Result<Self, LoadTestError> {
        let requests = config
            .request
            .iter()
            .map(|request| {
                Ok(PreparedRequest {
                    url: config.request_url(request)?,
                    headers: header_map(&config.headers_for(request))?,
                })
            })
            .collect::<Result<Vec<_>, LoadTestError>>()?;

        Ok(Self {
            client,
            requests,
            checks: config.check.clone(),
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.len()
    }
}

#[async_trait]
impl Scenario for HttpBatchScenario {
    async fn run_iteration(&self, vu_id: u32) -> IterationOutcome {
        let batch = join_all(
            self.requests
                .iter()
                .map(|request| self.client.get(&request.url, &request.headers)),
        )
        .await;

        let mut responses = Vec::with_capacity(batch.len());
        let mut errors = Vec::new();
        for (request, result) in self.requests.iter().zip(batch) {
            match result {
                Ok(response) => responses.push(response),
                Err(error) => {
                    debug!(vu_id, url = %request.url, %error, "request failed");
                    errors.push(error);
                },
            }
        }

        IterationOutcome {
            checks: evaluate_checks(&self.checks, &responses, errors.is_empty()),
            requests: self.requests.len() as u64,
            errors,
        }
    }
}

/// Evaluate every check against a batch.
///
/// When `batch_complete` is false (a request failed at the transport level)
/// every check fails for this iteration.
pub fn evaluate_checks(
    checks: &[CheckDef],
    responses: &[HttpResponse],
    batch_complete: bool,
) -> Vec<CheckResult> {
    checks
        .iter()
        .map(|check| CheckResult::new(check.name(), batch_complete && check_passes(check, responses)))
        .collect()
}

fn check_passes(check: &CheckDef, responses: &[HttpResponse]) -> bool {
    match check {
        CheckDef::BodyContains { marker, .. } => responses
            .iter()
            .any(|response| response.body.contains(marker.as_str())),
        CheckDef::Status { status, .. } => {
            !responses.is_empty() && responses.iter().all(|response| response.status == *status)
        },
    }
}

fn header_map(
    headers: &std::collections::BTreeMap<String, String>,
) -> Result<HeaderMap, LoadTestError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            LoadTestError::validation(format!("Invalid header name '{name}'"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|_| {
            LoadTestError::validation(format!("Invalid value for header '{name}'"))
        })?;
        map.insert(name, value);
    }
    Ok(map)
}
