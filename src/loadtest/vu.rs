//! Virtual user (VU) task loop for load test execution.
//!
//! Each VU runs the shared [`Scenario`] in a loop: iterate, record the check
//! results, think, repeat. Two tokens end the loop. `stop` prevents new
//! iterations and wakes VUs that are thinking; `abort` additionally drops
//! an iteration that is still in flight.

use crate::loadtest::checks::{CheckAggregator, CheckResult};
use crate::loadtest::scenario::{IterationOutcome, Scenario};

use dashmap::DashMap;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Atomic counter tracking currently active virtual users and the highest
/// count observed during the run.
///
/// Clone-friendly; clones share the same counts.
#[derive(Clone, Default)]
pub struct ActiveVuCounter(Arc<ActiveVuCounts>);

#[derive(Default)]
struct ActiveVuCounts {
    current: AtomicU32,
    peak: AtomicU32,
}

impl ActiveVuCounter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the active VU count by one and updates the peak.
    pub fn increment(&self) {
        let now = self.0.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.0.peak.fetch_max(now, Ordering::SeqCst);
    }

    /// Decrements the active VU count by one.
    pub fn decrement(&self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }

    /// Marks one VU active until the returned guard is dropped.
    pub fn enter(&self) -> ActiveVuGuard {
        self.increment();
        ActiveVuGuard(self.clone())
    }

    /// Returns the current number of active VUs.
    pub fn get(&self) -> u32 {
        self.0.current.load(Ordering::SeqCst)
    }

    /// Returns the highest number of simultaneously active VUs seen so far.
    pub fn peak(&self) -> u32 {
        self.0.peak.load(Ordering::SeqCst)
    }
}

/// Decrements the counter on drop, including when the VU task unwinds.
pub struct ActiveVuGuard(ActiveVuCounter);

impl Drop for ActiveVuGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Run-wide iteration and request counters.
#[derive(Clone, Default)]
pub struct RunCounters(Arc<RunCounts>);

#[derive(Default)]
struct RunCounts {
    iterations: AtomicU64,
    interrupted: AtomicU64,
    requests: AtomicU64,
    failed_requests: AtomicU64,
    error_categories: DashMap<&'static str, u64>,
}

/// Point-in-time copy of [`RunCounters`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub iterations: u64,
    pub interrupted_iterations: u64,
    pub requests: u64,
    pub failed_requests: u64,
    pub error_categories: BTreeMap<String, u64>,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a completed iteration and its requests.
    pub fn record_outcome(&self, outcome: &IterationOutcome) {
        self.0.iterations.fetch_add(1, Ordering::Relaxed);
        self.0.requests.fetch_add(outcome.requests, Ordering::Relaxed);
        self.0
            .failed_requests
            .fetch_add(outcome.failed_requests(), Ordering::Relaxed);
        for error in &outcome.errors {
            *self.0.error_categories.entry(error.error_category()).or_insert(0) += 1;
        }
    }

    /// Count an iteration dropped by `abort` before it completed.
    pub fn record_interrupted(&self) {
        self.0.interrupted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn iterations(&self) -> u64 {
        self.0.iterations.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> RunTotals {
        RunTotals {
            iterations: self.iterations(),
            interrupted_iterations: self.0.interrupted.load(Ordering::Relaxed),
            requests: self.0.requests.load(Ordering::Relaxed),
            failed_requests: self.0.failed_requests.load(Ordering::Relaxed),
            error_categories: self
                .0
                .error_categories
                .iter()
                .map(|entry| (entry.key().to_string(), *entry.value()))
                .collect(),
        }
    }
}

/// Shared budget for `--iterations`: total iterations across all VUs.
#[derive(Clone)]
pub struct IterationLimit {
    started: Arc<AtomicU64>,
    max: u64,
}

impl IterationLimit {
    pub fn new(max: u64) -> Self {
        Self {
            started: Arc::new(AtomicU64::new(0)),
            max,
        }
    }

    /// Claims one iteration; `false` once the budget is spent.
    pub fn try_acquire(&self) -> bool {
        self.started.fetch_add(1, Ordering::SeqCst) < self.max
    }
}

/// Everything a VU task shares with the engine.
#[derive(Clone)]
pub struct VuContext {
    pub scenario: Arc<dyn Scenario>,
    pub checks: CheckAggregator,
    pub counters: RunCounters,
    pub active_vus: ActiveVuCounter,
    pub think_time: Duration,
    pub stop: CancellationToken,
    pub abort: CancellationToken,
    pub iteration_limit: Option<IterationLimit>,
}

/// Why a VU left its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VuExit {
    Stopped,
    Aborted,
    IterationLimit,
}

/// Main VU task entry point.
///
/// Counts the VU as active for its whole lifetime and runs iterations until
/// one of the tokens or the iteration limit ends it.
pub async fn vu_loop(vu_id: u32, ctx: VuContext) -> VuExit {
    let _active = ctx.active_vus.enter();
    let exit = vu_loop_inner(vu_id, &ctx).await;
    debug!(vu_id, ?exit, "virtual user finished");
    exit
}

async fn vu_loop_inner(vu_id: u32, ctx: &VuContext) -> VuExit {
    loop {
        if ctx.stop.is_cancelled() {
            return VuExit::Stopped;
        }

        if let Some(limit) = &ctx.iteration_limit {
            if !limit.try_acquire() {
                ctx.stop.cancel();
                return VuExit::IterationLimit;
            }
        }

        let iteration = AssertUnwindSafe(ctx.scenario.run_iteration(vu_id)).catch_unwind();
        let outcome = tokio::select! {
            biased;
            _ = ctx.abort.cancelled() => {
                ctx.counters.record_interrupted();
                return VuExit::Aborted;
            },
            result = iteration => match result {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(vu_id, "Scenario panicked, recording a failed iteration");
                    panicked_outcome(&ctx.checks)
                },
            },
        };

        ctx.checks.record_all(&outcome.checks);
        ctx.counters.record_outcome(&outcome);

        if ctx.think_time.is_zero() {
            tokio::task::yield_now().await;
            continue;
        }
        tokio::select! {
            _ = tokio::time::sleep(ctx.think_time) => {},
            _ = ctx.stop.cancelled() => return VuExit::Stopped,
        }
    }
}

/// A panicked iteration fails every known check and issued no requests
/// that can be accounted for.
fn panicked_outcome(checks: &CheckAggregator) -> IterationOutcome {
    IterationOutcome {
        checks: checks.labels().into_iter().map(CheckResult::fail).collect(),
        requests: 0,
        errors: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadtest::error::RequestError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;

    struct SleepyScenario {
        delay: Duration,
    }

    #[async_trait]
    impl Scenario for SleepyScenario {
        async fn run_iteration(&self, _vu_id: u32) -> IterationOutcome {
            tokio::time::sleep(self.delay).await;
            IterationOutcome {
                checks: vec![CheckResult::pass("ok")],
                requests: 1,
                errors: Vec::new(),
            }
        }
    }

    fn context(delay: Duration, think_time: Duration) -> VuContext {
        VuContext {
            scenario: Arc::new(SleepyScenario { delay }),
            checks: CheckAggregator::new(),
            counters: RunCounters::new(),
            active_vus: ActiveVuCounter::new(),
            think_time,
            stop: CancellationToken::new(),
            abort: CancellationToken::new(),
            iteration_limit: None,
        }
    }

    #[test]
    fn test_active_vu_counter_increment_decrement() {
        let counter = ActiveVuCounter::new();
        assert_eq!(counter.get(), 0);
        counter.increment();
        counter.increment();
        assert_eq!(counter.get(), 2);
        counter.decrement();
        assert_eq!(counter.get(), 1);
        assert_eq!(counter.peak(), 2);
    }

    #[test]
    fn test_guard_decrements_on_drop() {
        let counter = ActiveVuCounter::new();
        {
            let _a = counter.enter();
            let _b = counter.enter();
            assert_eq!(counter.get(), 2);
        }
        assert_eq!(counter.get(), 0);
        assert_eq!(counter.peak(), 2);
    }

    #[test]
    fn test_iteration_limit_budget() {
        let limit = IterationLimit::new(2);
        let shared = limit.clone();
        assert!(limit.try_acquire());
        assert!(shared.try_acquire());
        assert!(!limit.try_acquire());
    }

    #[test]
    fn test_run_counters_snapshot() {
        let counters = RunCounters::new();
        counters.record_outcome(&IterationOutcome {
            checks: vec![CheckResult::fail("ok")],
            requests: 4,
            errors: vec![
                RequestError::Timeout,
                RequestError::Connection {
                    message: "refused".to_string(),
                },
                RequestError::Timeout,
            ],
        });
        counters.record_interrupted();

        let totals = counters.snapshot();
        assert_eq!(totals.iterations, 1);
        assert_eq!(totals.interrupted_iterations, 1);
        assert_eq!(totals.requests, 4);
        assert_eq!(totals.failed_requests, 3);
        assert_eq!(totals.error_categories["timeout"], 2);
        assert_eq!(totals.error_categories["connection"], 1);
    }

    #[tokio::test]
    async fn test_stopped_before_start_runs_nothing() {
        let ctx = context(Duration::ZERO, Duration::ZERO);
        ctx.stop.cancel();

        assert_eq!(vu_loop(0, ctx.clone()).await, VuExit::Stopped);
        assert_eq!(ctx.counters.iterations(), 0);
        assert_eq!(ctx.active_vus.get(), 0);
        assert_eq!(ctx.active_vus.peak(), 1);
    }

    #[tokio::test]
    async fn test_stop_wakes_think_time() {
        let ctx = context(Duration::ZERO, Duration::from_secs(60));
        let stop = ctx.stop.clone();
        let handle = tokio::spawn(vu_loop(0, ctx.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.cancel();

        let exit = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("VU should leave think-time promptly")
            .unwrap();
        assert_eq!(exit, VuExit::Stopped);
        assert_eq!(ctx.counters.iterations(), 1);
        assert_eq!(ctx.checks.snapshot().get("ok").unwrap().passes, 1);
    }

    #[tokio::test]
    async fn test_abort_drops_in_flight_iteration() {
        let ctx = context(Duration::from_secs(60), Duration::ZERO);
        let (stop, abort) = (ctx.stop.clone(), ctx.abort.clone());
        let handle = tokio::spawn(vu_loop(0, ctx.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.cancel();
        abort.cancel();

        let exit = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("VU should abort promptly")
            .unwrap();
        assert_eq!(exit, VuExit::Aborted);
        let totals = ctx.counters.snapshot();
        assert_eq!(totals.iterations, 0);
        assert_eq!(totals.interrupted_iterations, 1);
        assert_eq!(ctx.checks.snapshot().total(), 0);
    }

    #[tokio::test]
    async fn test_stop_lets_in_flight_iteration_finish() {
        let ctx = context(Duration::from_millis(200), Duration::ZERO);
        let stop = ctx.stop.clone();
        let handle = tokio::spawn(vu_loop(0, ctx.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.cancel();

        assert_eq!(handle.await.unwrap(), VuExit::Stopped);
        assert_eq!(ctx.counters.iterations(), 1);
        assert_eq!(ctx.counters.snapshot().interrupted_iterations, 0);
    }

    /// Panics on its first iteration only.
    struct PanicOnceScenario {
        panicked: AtomicBool,
    }

    #[async_trait]
    impl Scenario for PanicOnceScenario {
        async fn run_iteration(&self, _vu_id: u32) -> IterationOutcome {
            if !self.panicked.swap(true, Ordering::SeqCst) {
                panic!("scenario failure");
            }
            IterationOutcome {
                checks: vec![CheckResult::pass("ok")],
                requests: 1,
                errors: Vec::new(),
            }
        }
    }

    #[tokio::test]
    async fn test_panicking_iteration_fails_checks_and_vu_continues() {
        let mut ctx = context(Duration::ZERO, Duration::ZERO);
        ctx.scenario = Arc::new(PanicOnceScenario {
            panicked: AtomicBool::new(false),
        });
        ctx.iteration_limit = Some(IterationLimit::new(3));
        ctx.checks.register("ok");

        assert_eq!(vu_loop(0, ctx.clone()).await, VuExit::IterationLimit);
        let tally = ctx.checks.snapshot().get("ok").cloned().unwrap();
        assert_eq!(tally.fails, 1);
        assert_eq!(tally.passes, 2);
        assert_eq!(ctx.counters.iterations(), 3);
        assert_eq!(ctx.counters.snapshot().requests, 2);
        assert_eq!(ctx.active_vus.get(), 0);
    }

    #[tokio::test]
    async fn test_iteration_limit_stops_run() {
        let mut ctx = context(Duration::ZERO, Duration::ZERO);
        ctx.iteration_limit = Some(IterationLimit::new(5));

        assert_eq!(vu_loop(0, ctx.clone()).await, VuExit::IterationLimit);
        assert_eq!(ctx.counters.iterations(), 5);
        assert!(ctx.stop.is_cancelled());
    }
}
