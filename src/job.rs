//! Per-host work: connect, then run every spec assigned to the host

use crate::checks;
use crate::remote::{self, SessionProvider};
use crate::spec::VerifySpec;
use checkrun::{
    CancelToken, CheckResult, DispatchOptions, Dispatcher, HostOutcome, Job, ResultSink,
    TargetBatch,
};
use sshkit::{RetryConfig, SshOptions, Target};
use std::sync::Arc;
use std::time::Instant;

/// What one job checks
#[derive(Debug)]
pub struct HostPlan {
    pub target: Target,
    pub specs: Vec<Arc<VerifySpec>>,
}

/// Shared, read-only state for every job of a run
pub struct HostRunner {
    dispatcher: Dispatcher<VerifySpec>,
    ssh: SshOptions,
    retry: RetryConfig,
    stream: bool,
}

impl HostRunner {
    pub fn new(ssh: SshOptions, retry: RetryConfig) -> Self {
        Self {
            dispatcher: checks::dispatcher(),
            ssh,
            retry,
            stream: false,
        }
    }

    /// Print each check as it finishes instead of only in the final report
    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Job function for [`checkrun::ParallelExecutor::execute`]
    ///
    /// Once `cancel` fires the host is reported interrupted: every spec that
    /// never ran gets an empty interrupted batch, so no host that was cut
    /// short can pass.
    pub fn run(&self, cancel: &CancelToken, job: &Job<HostPlan>) -> HostOutcome {
        let start = Instant::now();
        let plan = &job.config;

        let connected = match remote::connect(&plan.target, &self.ssh, &self.retry, cancel) {
            Ok(connected) => connected,
            Err(failure) => {
                log::warn!("{}: {}", job.target, failure.error);
                let outcome =
                    HostOutcome::connection_failed(&job.target, failure.message(), start.elapsed())
                        .with_attempts(failure.attempts);
                return if cancel.is_cancelled() {
                    outcome.mark_interrupted()
                } else {
                    outcome
                };
            }
        };
        log::info!("{}: connected ({} attempts)", job.target, connected.attempts);

        let provider = SessionProvider::new(connected.session);
        let mut batches = Vec::with_capacity(plan.specs.len());

        for spec in &plan.specs {
            if cancel.is_cancelled() {
                log::debug!("{}: cancelled before spec '{}'", job.target, spec.name);
                let mut skipped = TargetBatch::new(&job.target, &spec.name);
                skipped.interrupted = true;
                batches.push(skipped);
                continue;
            }

            let mut stream = |result: &CheckResult| crate::report::print_live(&job.target, result);
            let sink: Option<&mut dyn ResultSink> = if self.stream { Some(&mut stream) } else { None };
            let batch = self.dispatcher.execute_with(
                &job.target,
                spec,
                &provider,
                DispatchOptions {
                    sink,
                    cancel: Some(cancel),
                },
            );
            batches.push(batch);
        }

        HostOutcome::connected(&job.target, batches, start.elapsed()).with_attempts(connected.attempts)
    }
}
