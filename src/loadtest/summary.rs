//! k6-style terminal summary renderer for load test results.
//!
//! Produces a colorized, human-readable summary with:
//! - ASCII art header with test configuration
//! - One line per check label, with the pass split for failing checks
//! - Dotted-line metric rows (metric.........: value)
//! - Error classification breakdown
//!
//! [`render_summary`] takes structured data and returns a formatted
//! [`String`]. Color coding respects the global `colored` override set when
//! `--no-color` is active or stdout is piped.

use colored::Colorize;

use crate::loadtest::checks::CheckTally;
use crate::loadtest::config::LoadTestConfig;
use crate::loadtest::engine::LoadTestResult;

/// Width for dotted metric row padding.
const PAD_WIDTH: usize = 32;

/// Render a k6-style terminal summary from load test results.
///
/// # Layout
///
/// ```text
///           /\      |  vuload
///          /  \     |
///     /\  /    \    |  target:    https://localhost
///    /  \/      \   |  vus:       1000
///   /    \       \  |  duration:  30s
///  /      \       \ |  requests:  4 per iteration
///
///   ✓ Homepage loaded
///
///   checks..........................: 100.00% ✓ 7000 ✗ 0
///   iterations......................: 7000  233.3/s
///   iterations_interrupted..........: 0
///   http_reqs.......................: 28000  933.3/s
///   http_req_failed.................: 0.00% (0 of 28000)
///   vus_max.........................: 1000
///   elapsed.........................: 30.0s
/// ```
pub fn render_summary(result: &LoadTestResult, config: &LoadTestConfig) -> String {
    let mut lines = Vec::new();

    lines.push(render_header(
        &config.target.host,
        config.settings.virtual_users,
        config.settings.duration_secs,
        config.request.len(),
    ));

    for tally in &result.checks.checks {
        lines.extend(render_check(tally));
    }
    if !result.checks.checks.is_empty() {
        lines.push(String::new());
    }

    let checks = &result.checks;
    let rate = format!("{:.2}%", checks.pass_rate() * 100.0);
    let rate_colored = if checks.total() > 0 && checks.fails() == 0 {
        rate.green().to_string()
    } else {
        rate.red().to_string()
    };
    lines.push(format_metric_row(
        "checks",
        &format!("{rate_colored} ✓ {} ✗ {}", checks.passes(), checks.fails()),
        PAD_WIDTH,
    ));

    lines.push(format_metric_row(
        "iterations",
        &format!("{}  {:.1}/s", result.iterations, result.iterations_per_sec()),
        PAD_WIDTH,
    ));

    let interrupted = if result.interrupted_iterations > 0 {
        result.interrupted_iterations.to_string().yellow().to_string()
    } else {
        result.interrupted_iterations.to_string()
    };
    lines.push(format_metric_row(
        "iterations_interrupted",
        &interrupted,
        PAD_WIDTH,
    ));

    lines.push(format_metric_row(
        "http_reqs",
        &format!("{}  {:.1}/s", result.requests, result.requests_per_sec()),
        PAD_WIDTH,
    ));

    let failed_pct = if result.requests > 0 {
        result.failed_requests as f64 / result.requests as f64 * 100.0
    } else {
        0.0
    };
    let failed_str = format!("{failed_pct:.2}%");
    let failed_colored = if result.failed_requests > 0 {
        failed_str.red().to_string()
    } else {
        failed_str.green().to_string()
    };
    lines.push(format_metric_row(
        "http_req_failed",
        &format!(
            "{failed_colored} ({} of {})",
            result.failed_requests, result.requests
        ),
        PAD_WIDTH,
    ));

    lines.push(format_metric_row(
        "vus_max",
        &result.peak_active_vus.to_string(),
        PAD_WIDTH,
    ));

    lines.push(format_metric_row(
        "elapsed",
        &format!("{:.1}s", result.elapsed.as_secs_f64()),
        PAD_WIDTH,
    ));

    // Error breakdown (only when errors exist)
    if !result.error_categories.is_empty() {
        lines.push(String::new());
        lines.push("  errors:".to_string());
        let mut categories: Vec<_> = result.error_categories.iter().collect();
        categories.sort_by(|a, b| b.1.cmp(a.1));
        for (category, count) in categories {
            lines.push(format_metric_row(
                &format!("    {category}"),
                &count.to_string().red().to_string(),
                PAD_WIDTH,
            ));
        }
    }

    lines.join("\n")
}

/// `✓ name` for a check that never failed; otherwise `✗ name` followed by
/// its pass split.
fn render_check(tally: &CheckTally) -> Vec<String> {
    if tally.fails == 0 && tally.passes > 0 {
        return vec![format!("  {} {}", "✓".green(), tally.name)];
    }
    vec![
        format!("  {} {}", "✗".red(), tally.name),
        format!(
            "   ↳  {:.0}% : ✓ {} / ✗ {}",
            tally.pass_rate() * 100.0,
            tally.passes,
            tally.fails
        ),
    ]
}

/// Render the ASCII art header with test configuration details.
fn render_header(url: &str, vus: u32, duration_secs: u64, request_count: usize) -> String {
    format!(
        r#"
          /\      |  {}
         /  \     |
    /\  /    \    |  target:    {}
   /  \/      \   |  vus:       {}
  /    \       \  |  duration:  {}s
 /      \       \ |  requests:  {} per iteration
"#,
        "vuload".bold(),
        url,
        vus,
        duration_secs,
        request_count,
    )
}

/// Format a single metric row with dot-padding.
///
/// Produces: `"  metric_name..................: value_string"`
fn format_metric_row(name: &str, value: &str, pad_width: usize) -> String {
    format!("  {name:.<pad_width$}: {value}")
}
