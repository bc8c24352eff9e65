//! Live progress for fleet runs

use crate::types::HostOutcome;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Running totals, updated as each host outcome is collected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressCounts {
    pub total: usize,
    pub completed: usize,
    pub passed: usize,
    pub failed: usize,
    pub connection_errors: usize,
}

impl ProgressCounts {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Count a collected host
    pub fn add(&mut self, host: &HostOutcome) {
        self.completed += 1;
        if !host.connected {
            self.connection_errors += 1;
        }
        if host.success() {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Status line text, e.g. `3/10 hosts | 2 passed | 1 failed | 0 conn errors`
    pub fn line(&self) -> String {
        format!(
            "{}/{} hosts | {} passed | {} failed | {} conn errors",
            self.completed, self.total, self.passed, self.failed, self.connection_errors
        )
    }
}

/// Progress callback for fleet runs
///
/// Called from the collector only, one host at a time, never while the
/// accumulator lock is held.
pub trait FleetProgress: Send {
    fn on_start(&mut self, _total: usize) {}

    fn on_host_complete(&mut self, target: &str, success: bool, counts: &ProgressCounts);

    fn on_finish(&mut self, _counts: &ProgressCounts) {}
}

/// No-op progress callback
pub struct NoFleetProgress;

impl FleetProgress for NoFleetProgress {
    fn on_host_complete(&mut self, _target: &str, _success: bool, _counts: &ProgressCounts) {}
}

/// Single status line on stderr, overwritten in place after every host
///
/// indicatif hides the line when stderr is not a terminal.
pub struct StatusLine {
    bar: ProgressBar,
}

impl StatusLine {
    pub fn new() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl Default for StatusLine {
    fn default() -> Self {
        Self::new()
    }
}

impl FleetProgress for StatusLine {
    fn on_start(&mut self, total: usize) {
        let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
        if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{elapsed}] {msg}") {
            bar.set_style(style);
        }
        bar.set_message(ProgressCounts::new(total).line());
        self.bar = bar;
    }

    fn on_host_complete(&mut self, target: &str, success: bool, counts: &ProgressCounts) {
        let symbol = if success { "✓" } else { "✗" };
        self.bar.set_message(format!("{} | last: {} {}", counts.line(), symbol, target));
        self.bar.inc(1);
    }

    fn on_finish(&mut self, _counts: &ProgressCounts) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_counts_track_hosts() {
        let mut counts = ProgressCounts::new(3);
        counts.add(&HostOutcome::connected("a", Vec::new(), Duration::ZERO));
        counts.add(&HostOutcome::connection_failed("b", "refused", Duration::ZERO));

        assert_eq!(
            counts,
            ProgressCounts {
                total: 3,
                completed: 2,
                passed: 1,
                failed: 1,
                connection_errors: 1,
            }
        );
        assert_eq!(
            counts.line(),
            "2/3 hosts | 1 passed | 1 failed | 1 conn errors"
        );
    }
}
