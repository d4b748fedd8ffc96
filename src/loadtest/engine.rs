//! Load test execution engine with bounded duration and policy-driven shutdown.
//!
//! [`LoadTestEngine`] is the top-level orchestrator that:
//! - Spawns N virtual user tasks at once via [`tokio_util::task::TaskTracker`]
//! - Shares one [`CheckAggregator`] and one set of run counters between them
//! - Stops new iterations when the duration, the iteration limit or Ctrl+C
//!   ends the run
//! - Applies the configured [`ShutdownPolicy`] to iterations still in flight

use crate::loadtest::checks::{CheckAggregator, ChecksSnapshot};
use crate::loadtest::client::HttpClient;
use crate::loadtest::config::{LoadTestConfig, ShutdownPolicy};
use crate::loadtest::display::{display_loop, DisplaySources};
use crate::loadtest::error::LoadTestError;
use crate::loadtest::scenario::{HttpBatchScenario, IterationOutcome, Scenario};
use crate::loadtest::vu::{vu_loop, ActiveVuCounter, IterationLimit, RunCounters, VuContext};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Compile-time Send bounds verification for types crossing task boundaries.
fn _assert_send<T: Send>() {}
#[allow(dead_code)]
fn _check_send_bounds() {
    _assert_send::<IterationOutcome>();
    _assert_send::<VuContext>();
    _assert_send::<LoadTestResult>();
}

/// Top-level load test engine configuration and entry point.
pub struct LoadTestEngine {
    config: LoadTestConfig,
    scenario: Option<Arc<dyn Scenario>>,
    max_iterations: Option<u64>,
    show_progress: bool,
    no_color: bool,
    handle_signals: bool,
}

impl LoadTestEngine {
    /// Creates an engine that runs the config's request batch and checks.
    pub fn new(config: LoadTestConfig) -> Self {
        Self {
            config,
            scenario: None,
            max_iterations: None,
            show_progress: false,
            no_color: false,
            handle_signals: true,
        }
    }

    /// Runs `scenario` instead of the configured request batch. Only the
    /// config's `[settings]` apply.
    pub fn with_scenario(mut self, scenario: Arc<dyn Scenario>) -> Self {
        self.scenario = Some(scenario);
        self
    }

    /// Sets an iteration limit. The test stops after this many total iterations
    /// across all VUs (first-limit-wins with duration).
    pub fn with_iterations(mut self, n: u64) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Enables the live terminal display.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Disables colored output.
    pub fn with_no_color(mut self, no_color: bool) -> Self {
        self.no_color = no_color;
        self
    }

    /// Controls whether `run` listens for Ctrl+C (on by default). Embedders
    /// that own the process's signal handling turn it off.
    pub fn with_signal_handling(mut self, handle_signals: bool) -> Self {
        self.handle_signals = handle_signals;
        self
    }

    /// Returns a reference to the engine's configuration.
    pub fn config(&self) -> &LoadTestConfig {
        &self.config
    }

    /// Returns the configured max iterations, if any.
    pub fn max_iterations(&self) -> Option<u64> {
        self.max_iterations
    }

    pub fn handles_signals(&self) -> bool {
        self.handle_signals
    }

    /// Validate, build the scenario and run the test to completion.
    ///
    /// Configuration problems are returned before any virtual user starts.
    /// Failed requests and failed checks are results, not errors.
    pub async fn run(&self) -> Result<LoadTestResult, LoadTestError> {
        let scenario = match &self.scenario {
            Some(scenario) => {
                self.config.validate_settings()?;
                scenario.clone()
            },
            None => {
                self.config.validate()?;
                let client = HttpClient::from_config(&self.config)?;
                Arc::new(HttpBatchScenario::from_config(&self.config, client)?) as Arc<dyn Scenario>
            },
        };
        Ok(self.run_scenario(scenario).await)
    }

    async fn run_scenario(&self, scenario: Arc<dyn Scenario>) -> LoadTestResult {
        let settings = &self.config.settings;
        let vu_count = settings.virtual_users;
        let stop = CancellationToken::new();
        let abort = CancellationToken::new();
        let done = CancellationToken::new();
        let tracker = TaskTracker::new();
        let active_vus = ActiveVuCounter::new();
        let counters = RunCounters::new();

        let checks = CheckAggregator::new();
        for check in &self.config.check {
            checks.register(check.name());
        }

        let ctx = VuContext {
            scenario,
            checks: checks.clone(),
            counters: counters.clone(),
            active_vus: active_vus.clone(),
            think_time: self.config.think_time(),
            stop: stop.clone(),
            abort: abort.clone(),
            iteration_limit: self.max_iterations.map(IterationLimit::new),
        };

        info!(
            virtual_users = vu_count,
            duration_secs = settings.duration_secs,
            shutdown = ?settings.shutdown,
            "Starting load test"
        );

        let test_start = Instant::now();
        for vu_id in 0..vu_count {
            tracker.spawn(vu_loop(vu_id, ctx.clone()));
        }
        tracker.close();
        drop(ctx);

        let display_handle = self.show_progress.then(|| {
            tokio::spawn(display_loop(
                DisplaySources {
                    checks: checks.clone(),
                    counters: counters.clone(),
                    active_vus: active_vus.clone(),
                    target_vus: vu_count,
                },
                done.clone(),
                self.no_color,
                test_start,
            ))
        });
        let signal_handle = self
            .handle_signals
            .then(|| tokio::spawn(handle_ctrl_c(stop.clone(), abort.clone())));

        // Run controller -- first-limit-wins between duration, iteration limit, Ctrl+C
        tokio::select! {
            _ = tokio::time::sleep(self.config.duration()) => {
                info!("Test duration elapsed, stopping virtual users");
            },
            _ = stop.cancelled() => {
                info!("Run stopped before the duration elapsed");
            },
        }
        stop.cancel();

        match settings.shutdown {
            ShutdownPolicy::Abort => abort.cancel(),
            ShutdownPolicy::Graceful => {
                let grace = self.config.grace_period();
                tokio::select! {
                    _ = tracker.wait() => {},
                    _ = abort.cancelled() => {},
                    _ = tokio::time::sleep(grace) => {
                        warn!(
                            grace_period_ms = settings.grace_period_ms,
                            still_active = active_vus.get(),
                            "Grace period expired, aborting in-flight iterations"
                        );
                        abort.cancel();
                    },
                }
            },
        }

        tracker.wait().await;
        if let Some(handle) = signal_handle {
            handle.abort();
        }
        done.cancel();
        if let Some(handle) = display_handle {
            let _ = handle.await;
        }

        let totals = counters.snapshot();
        let result = LoadTestResult {
            checks: checks.snapshot(),
            iterations: totals.iterations,
            interrupted_iterations: totals.interrupted_iterations,
            requests: totals.requests,
            failed_requests: totals.failed_requests,
            error_categories: totals.error_categories,
            elapsed: test_start.elapsed(),
            peak_active_vus: active_vus.peak(),
            final_active_vus: active_vus.get(),
        };

        info!(
            iterations = result.iterations,
            interrupted = result.interrupted_iterations,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Load test finished"
        );
        result
    }
}

/// Final result of a load test run.
#[derive(Debug, Clone)]
pub struct LoadTestResult {
    /// Pass/fail tallies per check label.
    pub checks: ChecksSnapshot,
    /// Iterations that completed and recorded their checks.
    pub iterations: u64,
    /// Iterations dropped by an abort before they completed.
    pub interrupted_iterations: u64,
    pub requests: u64,
    pub failed_requests: u64,
    /// Failed request counts keyed by error category.
    pub error_categories: BTreeMap<String, u64>,
    /// Total elapsed time of the test, including shutdown.
    pub elapsed: Duration,
    /// Highest number of simultaneously active VUs.
    pub peak_active_vus: u32,
    /// Number of VUs that were still active at test end.
    pub final_active_vus: u32,
}

impl LoadTestResult {
    pub fn iterations_per_sec(&self) -> f64 {
        per_sec(self.iterations, self.elapsed)
    }

    pub fn requests_per_sec(&self) -> f64 {
        per_sec(self.requests, self.elapsed)
    }
}

fn per_sec(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

/// First Ctrl+C stops the run like duration expiry; a second one aborts
/// in-flight iterations.
async fn handle_ctrl_c(stop: CancellationToken, abort: CancellationToken) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "Failed to install Ctrl+C handler");
        return;
    }
    eprintln!("\nReceived Ctrl+C, stopping gracefully...");
    stop.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("\nReceived second Ctrl+C, aborting in-flight iterations.");
        abort.cancel();
    }
}
