//! Result model for check runs
//!
//! Three levels of aggregation:
//! - [`CheckResult`]: one check
//! - [`TargetBatch`]: every check of one spec against one target
//! - [`HostOutcome`] / [`FleetOutcome`]: one target end-to-end, and a whole run

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::Duration;

fn as_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Outcome status of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The check ran and the asserted condition holds
    Passed,
    /// The check ran and the asserted condition does not hold
    Failed,
    /// The check was not evaluated (not applicable on this target)
    Skipped,
    /// The check could not be evaluated (backend failure)
    Errored,
}

impl Status {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Passed => "✓",
            Self::Failed => "✗",
            Self::Skipped => "⊘",
            Self::Errored => "!",
        }
    }
}

/// Outcome of one check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub status: Status,
    pub message: String,
    #[serde(serialize_with = "as_secs")]
    pub duration: Duration,
    /// Structured diagnostics (discovered version, uid, ...)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl CheckResult {
    pub fn new(name: impl Into<String>, status: Status, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
            duration: Duration::ZERO,
            details: BTreeMap::new(),
        }
    }

    pub fn passed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Status::Passed, message)
    }

    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Status::Failed, message)
    }

    pub fn skipped(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Status::Skipped, message)
    }

    pub fn errored(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Status::Errored, message)
    }

    /// Pass or fail depending on `ok`
    pub fn from_bool(
        name: impl Into<String>,
        ok: bool,
        passed: impl Into<String>,
        failed: impl Into<String>,
    ) -> Self {
        if ok {
            Self::passed(name, passed)
        } else {
            Self::failed(name, failed)
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Counts over a [`TargetBatch`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errored: usize,
}

impl BatchSummary {
    /// Add a result to the summary
    pub fn add_result(&mut self, result: &CheckResult) {
        self.total += 1;
        match result.status {
            Status::Passed => self.passed += 1,
            Status::Failed => self.failed += 1,
            Status::Skipped => self.skipped += 1,
            Status::Errored => self.errored += 1,
        }
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &BatchSummary) {
        self.total += other.total;
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.errored += other.errored;
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }
}

/// All checks of one spec run against one target
///
/// Results are in execution order: declaration order within a domain,
/// domains in the dispatcher's registration order.
#[derive(Debug, Clone, Serialize)]
pub struct TargetBatch {
    pub target: String,
    pub spec_name: String,
    pub started_at: DateTime<Utc>,
    #[serde(serialize_with = "as_secs")]
    pub duration: Duration,
    pub results: Vec<CheckResult>,
    /// The run was cancelled before every check got a chance to run
    pub interrupted: bool,
}

impl TargetBatch {
    pub fn new(target: impl Into<String>, spec_name: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            spec_name: spec_name.into(),
            started_at: Utc::now(),
            duration: Duration::ZERO,
            results: Vec::new(),
            interrupted: false,
        }
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for result in &self.results {
            summary.add_result(result);
        }
        summary
    }

    /// Every check ran, none failed and none errored. Skipped checks don't
    /// count against it.
    pub fn success(&self) -> bool {
        !self.interrupted && self.summary().is_success()
    }
}

/// One target attempted end-to-end
#[derive(Debug, Clone, Serialize)]
pub struct HostOutcome {
    pub target: String,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_error: Option<String>,
    /// Usually one batch; one per spec when a host runs several spec files
    pub batches: Vec<TargetBatch>,
    #[serde(serialize_with = "as_secs")]
    pub duration: Duration,
    /// Connection attempts made (1 when the first attempt succeeded)
    pub attempts: u32,
    /// Cancellation stopped this host before all of its work was done
    pub interrupted: bool,
}

impl HostOutcome {
    /// A target that was reached; interrupted when any batch was
    pub fn connected(target: impl Into<String>, batches: Vec<TargetBatch>, duration: Duration) -> Self {
        let interrupted = batches.iter().any(|b| b.interrupted);
        Self {
            target: target.into(),
            connected: true,
            connection_error: None,
            batches,
            duration,
            attempts: 1,
            interrupted,
        }
    }

    /// A target that could not be reached; never carries batches
    pub fn connection_failed(
        target: impl Into<String>,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            target: target.into(),
            connected: false,
            connection_error: Some(error.into()),
            batches: Vec::new(),
            duration,
            attempts: 1,
            interrupted: false,
        }
    }

    /// Mark the host as cut short by cancellation
    pub fn mark_interrupted(mut self) -> Self {
        self.interrupted = true;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn success(&self) -> bool {
        self.connected && !self.interrupted && self.batches.iter().all(TargetBatch::success)
    }

    /// Check counts across every batch of this host
    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for batch in &self.batches {
            summary.merge(&batch.summary());
        }
        summary
    }
}

/// Host counts over a [`FleetOutcome`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FleetSummary {
    pub total_hosts: usize,
    pub passed_hosts: usize,
    pub failed_hosts: usize,
    /// Hosts that never connected; these are also counted in `failed_hosts`
    pub connection_errors: usize,
}

/// Result of a whole run across many targets
///
/// `hosts` is in completion order, not submission order: with more than one
/// worker the order differs between runs. Use [`FleetOutcome::sort_by_target`]
/// when a stable order is needed. Targets that were never attempted (the run
/// was cancelled before they were dequeued) are absent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FleetOutcome {
    pub hosts: Vec<HostOutcome>,
    #[serde(serialize_with = "as_secs")]
    pub duration: Duration,
    /// Cancellation left work undone: a job was never started or a host
    /// was interrupted
    pub cancelled: bool,
}

impl FleetOutcome {
    pub fn summary(&self) -> FleetSummary {
        let mut summary = FleetSummary {
            total_hosts: self.hosts.len(),
            ..Default::default()
        };
        for host in &self.hosts {
            if !host.connected {
                summary.connection_errors += 1;
            }
            if host.success() {
                summary.passed_hosts += 1;
            } else {
                summary.failed_hosts += 1;
            }
        }
        summary
    }

    pub fn success(&self) -> bool {
        !self.cancelled && self.hosts.iter().all(HostOutcome::success)
    }

    pub fn sort_by_target(&mut self) {
        self.hosts.sort_by(|a, b| a.target.cmp(&b.target));
    }

    /// Check counts across every host
    pub fn check_summary(&self) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for host in &self.hosts {
            summary.merge(&host.summary());
        }
        summary
    }
}

/// A unit of work for the parallel executor
///
/// `config` is opaque to the executor; the job function interprets it.
#[derive(Debug, Clone)]
pub struct Job<C> {
    pub target: String,
    pub config: C,
}

impl<C> Job<C> {
    pub fn new(target: impl Into<String>, config: C) -> Self {
        Self {
            target: target.into(),
            config,
        }
    }
}
