//! Named check results and their run-wide aggregation.
//!
//! Every virtual user records into the same [`CheckAggregator`]. Counts are
//! keyed by check label and only ever grow, so a snapshot taken at any
//! point is a consistent lower bound of the final tally.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Outcome of one check in one iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
}

impl CheckResult {
    pub fn new(name: impl Into<String>, passed: bool) -> Self {
        Self {
            name: name.into(),
            passed,
        }
    }

    pub fn pass(name: impl Into<String>) -> Self {
        Self::new(name, true)
    }

    pub fn fail(name: impl Into<String>) -> Self {
        Self::new(name, false)
    }
}

#[derive(Debug, Default)]
struct CheckCounts {
    passes: AtomicU64,
    fails: AtomicU64,
}

/// Concurrency-safe pass/fail counts per check label.
///
/// Cloning is cheap; clones share the same counts.
#[derive(Debug, Clone, Default)]
pub struct CheckAggregator {
    counts: Arc<DashMap<String, CheckCounts>>,
}

impl CheckAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `name` appear in snapshots even before its first result.
    pub fn register(&self, name: &str) {
        if !self.counts.contains_key(name) {
            self.counts.entry(name.to_owned()).or_default();
        }
    }

    pub fn record(&self, result: &CheckResult) {
        // Read lock on the hot path; the write lock is only taken once per label.
        if let Some(counts) = self.counts.get(&result.name) {
            counts.bump(result.passed);
            return;
        }
        self.counts
            .entry(result.name.clone())
            .or_default()
            .bump(result.passed);
    }

    /// Every label seen so far, registered or recorded.
    pub fn labels(&self) -> Vec<String> {
        self.counts.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn record_all(&self, results: &[CheckResult]) {
        for result in results {
            self.record(result);
        }
    }

    /// Current tallies, sorted by check label.
    pub fn snapshot(&self) -> ChecksSnapshot {
        let mut checks: Vec<CheckTally> = self
            .counts
            .iter()
            .map(|entry| CheckTally {
                name: entry.key().clone(),
                passes: entry.value().passes.load(Ordering::Relaxed),
                fails: entry.value().fails.load(Ordering::Relaxed),
            })
            .collect();
        checks.sort_by(|a, b| a.name.cmp(&b.name));
        ChecksSnapshot { checks }
    }
}

impl CheckCounts {
    fn bump(&self, passed: bool) {
        let counter = if passed { &self.passes } else { &self.fails };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Pass/fail totals for one check label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckTally {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

impl CheckTally {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }

    /// Fraction of passing results in `[0.0, 1.0]`; `0.0` when nothing ran.
    pub fn pass_rate(&self) -> f64 {
        ratio(self.passes, self.total())
    }
}

/// Point-in-time copy of every check's tally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksSnapshot {
    pub checks: Vec<CheckTally>,
}

impl ChecksSnapshot {
    pub fn get(&self, name: &str) -> Option<&CheckTally> {
        self.checks.iter().find(|tally| tally.name == name)
    }

    pub fn passes(&self) -> u64 {
        self.checks.iter().map(|t| t.passes).sum()
    }

    pub fn fails(&self) -> u64 {
        self.checks.iter().map(|t| t.fails).sum()
    }

    pub fn total(&self) -> u64 {
        self.passes() + self.fails()
    }

    pub fn pass_rate(&self) -> f64 {
        ratio(self.passes(), self.total())
    }

    /// True when at least one result was recorded and none failed.
    pub fn all_passed(&self) -> bool {
        self.total() > 0 && self.fails() == 0
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
