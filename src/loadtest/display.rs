//! k6-style live terminal display for load test progress.
//!
//! Renders a single in-place updating line with active VU count, completed
//! iterations, the check pass rate and elapsed time. It polls the shared
//! counters once per second rather than reacting to every result.

use crate::loadtest::checks::{CheckAggregator, ChecksSnapshot};
use crate::loadtest::vu::{ActiveVuCounter, RunCounters, RunTotals};

use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// How often the status line is refreshed.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Shared run state the display reads on every refresh.
#[derive(Clone)]
pub struct DisplaySources {
    pub checks: CheckAggregator,
    pub counters: RunCounters,
    pub active_vus: ActiveVuCounter,
    pub target_vus: u32,
}

/// k6-style live terminal display for load test progress.
pub struct LiveDisplay {
    _multi: MultiProgress,
    status_bar: ProgressBar,
}

impl LiveDisplay {
    /// Create a new live display.
    ///
    /// If `no_color` is true or stderr is not a terminal (piped),
    /// color output is disabled.
    pub fn new(no_color: bool) -> Self {
        if no_color || !std::io::stderr().is_terminal() {
            colored::control::set_override(false);
        }

        let multi = MultiProgress::new();
        let status_bar = multi.add(ProgressBar::new_spinner());
        let style = ProgressStyle::with_template("{spinner:.cyan} {wide_msg}")
            .map(|style| style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"))
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        status_bar.set_style(style);
        status_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            _multi: multi,
            status_bar,
        }
    }

    /// Format a single line of live status.
    ///
    /// The check rate is green at 100%, yellow while some checks fail and
    /// red when nothing passed.
    pub fn format_status(
        checks: &ChecksSnapshot,
        totals: &RunTotals,
        elapsed: Duration,
        active_vus: u32,
        target_vus: u32,
    ) -> String {
        let vu_display = format!("{active_vus}/{target_vus}").green();
        let rate = format!("{:.1}%", checks.pass_rate() * 100.0);
        let rate_display = if checks.total() == 0 {
            rate.normal()
        } else if checks.fails() == 0 {
            rate.green()
        } else if checks.passes() == 0 {
            rate.red()
        } else {
            rate.yellow()
        };
        let failed = if totals.failed_requests > 0 {
            totals.failed_requests.to_string().red().to_string()
        } else {
            totals.failed_requests.to_string()
        };

        format!(
            "  vus: {}  |  iterations: {}  |  checks: {} (✓ {} ✗ {})  |  failed reqs: {}  |  elapsed: {}s",
            vu_display,
            totals.iterations,
            rate_display,
            checks.passes(),
            checks.fails(),
            failed,
            elapsed.as_secs()
        )
    }

    pub fn update(&self, message: String) {
        self.status_bar.set_message(message);
    }

    /// Stop the display and clear the spinner.
    pub fn finish(&self) {
        self.status_bar.finish_and_clear();
    }
}

/// Run the live display loop until `done` is cancelled.
pub async fn display_loop(
    sources: DisplaySources,
    done: CancellationToken,
    no_color: bool,
    test_start: Instant,
) {
    let display = LiveDisplay::new(no_color);
    let render = || {
        LiveDisplay::format_status(
            &sources.checks.snapshot(),
            &sources.counters.snapshot(),
            test_start.elapsed(),
            sources.active_vus.get(),
            sources.target_vus,
        )
    };

    eprintln!();
    eprintln!("  Running load test...");
    eprintln!();

    let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => display.update(render()),
            _ = done.cancelled() => {
                display.update(render());
                break;
            },
        }
    }

    display.finish();
}
