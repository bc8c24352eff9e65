//! Parallel executor - fans per-host work out over a bounded worker pool
//!
//! Three flows run side by side for the duration of [`ParallelExecutor::execute`]:
//! a feeder pushing jobs into a bounded queue, `workers` workers pulling from
//! it, and a collector draining finished outcomes into the fleet result.
//! Jobs and outcomes only travel through the two queues; the accumulator is
//! the only shared state and sits behind one mutex.

use crate::cancel::CancelToken;
use crate::progress::{FleetProgress, NoFleetProgress, ProgressCounts, StatusLine};
use crate::types::{FleetOutcome, HostOutcome, Job};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// `execute` has not been called
    Idle,
    /// Workers are draining jobs
    Running,
    /// Every job was attempted
    Completed,
    /// Fail-fast or the deadline fired; some jobs may never have started
    Cancelled,
}

/// Shared accumulator, guarded by one mutex
struct Accumulator {
    outcome: FleetOutcome,
    counts: ProgressCounts,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Append-only state stays consistent even if a holder panicked.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs per-host jobs concurrently
///
/// # Example
///
/// ```ignore
/// let mut executor = ParallelExecutor::new(8, true, false);
/// let fleet = executor.execute(jobs, |cancel, job| {
///     match connect(&job.target, cancel) {
///         Ok(provider) => run_checks(&job.target, &provider),
///         Err(e) => HostOutcome::connection_failed(&job.target, e.to_string(), Duration::ZERO),
///     }
/// })?;
/// ```
pub struct ParallelExecutor {
    workers: usize,
    fail_fast: bool,
    verbose: bool,
    timeout: Option<Duration>,
    cancel: Option<CancelToken>,
    progress: Option<Box<dyn FleetProgress>>,
    state: RunState,
}

impl ParallelExecutor {
    /// `workers` is clamped to at least one. `verbose` suppresses the
    /// stderr status line (use when per-host output is printed instead).
    pub fn new(workers: usize, fail_fast: bool, verbose: bool) -> Self {
        Self {
            workers: workers.max(1),
            fail_fast,
            verbose,
            timeout: None,
            cancel: None,
            progress: None,
            state: RunState::Idle,
        }
    }

    /// Deadline for the whole run, measured from the start of `execute`
    ///
    /// Ignored when a token is supplied through [`with_cancel_token`](Self::with_cancel_token);
    /// give that token its own deadline instead.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Use a caller-owned token, so the run can be cancelled from outside
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Replace the default stderr status line
    pub fn with_progress(mut self, progress: Box<dyn FleetProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run every job through `job_fn`, at most `workers` at a time
    ///
    /// Outcomes are collected in completion order. With fail-fast enabled,
    /// the first outcome whose `success()` is false cancels the run: jobs
    /// already inside `job_fn` finish (they see the token and should return
    /// promptly), jobs not yet started are dropped and do not appear in the
    /// result.
    ///
    /// A job function that stops early because the token fired should say so
    /// with an interrupted outcome ([`HostOutcome::mark_interrupted`], or a
    /// batch with `interrupted` set). The run is reported `cancelled` only
    /// when work was actually left undone: a job never started or a host
    /// interrupted. Fail-fast triggered by the last job cancels nothing.
    ///
    /// Returns once every worker has exited and every outcome is collected.
    /// Fails only if the worker pool cannot be created.
    pub fn execute<C, F>(&mut self, jobs: Vec<Job<C>>, job_fn: F) -> Result<FleetOutcome>
    where
        C: Send,
        F: Fn(&CancelToken, &Job<C>) -> HostOutcome + Sync,
    {
        let start = Instant::now();
        if jobs.is_empty() {
            self.state = RunState::Completed;
            return Ok(FleetOutcome::default());
        }

        let total = jobs.len();
        let workers = self.workers.min(total);
        let fail_fast = self.fail_fast;
        let token = match (&self.cancel, self.timeout) {
            (Some(token), _) => token.clone(),
            (None, Some(timeout)) => CancelToken::with_timeout(timeout),
            (None, None) => CancelToken::new(),
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("check-worker-{i}"))
            .build()
            .context("Failed to create worker thread pool")?;

        log::debug!(
            "Running {} jobs on {} workers (fail_fast={})",
            total,
            workers,
            fail_fast
        );
        self.state = RunState::Running;

        let mut status_line = StatusLine::new();
        let mut silent = NoFleetProgress;
        let progress: &mut dyn FleetProgress = match self.progress.as_deref_mut() {
            Some(progress) => progress,
            None if self.verbose => &mut silent,
            None => &mut status_line,
        };
        progress.on_start(total);

        let (job_tx, job_rx) = mpsc::sync_channel::<Job<C>>(workers * 2);
        let (result_tx, result_rx) = mpsc::sync_channel::<HostOutcome>(workers * 2);
        let job_rx = Mutex::new(job_rx);
        let shared = Mutex::new(Accumulator {
            outcome: FleetOutcome::default(),
            counts: ProgressCounts::new(total),
        });
        let cut_short = AtomicBool::new(false);
        let skipped = AtomicUsize::new(0);

        {
            let token = &token;
            let job_rx = &job_rx;
            let shared = &shared;
            let cut_short = &cut_short;
            let skipped = &skipped;
            let job_fn = &job_fn;
            let progress = &mut *progress;

            thread::scope(|scope| {
                scope.spawn(move || feed(jobs, &job_tx, token, cut_short));
                scope.spawn(move || collect(&result_rx, shared, progress));

                pool.scope(|s| {
                    for id in 0..workers {
                        let result_tx = result_tx.clone();
                        s.spawn(move |_| {
                            work(id, job_rx, &result_tx, token, job_fn, fail_fast, cut_short, skipped);
                        });
                    }
                });

                // Last sender gone: the collector drains what is left and exits.
                drop(result_tx);
            });
        }

        let mut acc = shared.into_inner().unwrap_or_else(PoisonError::into_inner);
        progress.on_finish(&acc.counts);

        let cancelled = cut_short.load(Ordering::SeqCst);
        let never_started = total - acc.outcome.hosts.len();
        if cancelled {
            log::info!(
                "Run cancelled: {} of {} jobs never started, {} interrupted",
                never_started,
                total,
                acc.outcome.hosts.iter().filter(|h| h.interrupted).count()
            );
        }
        log::debug!("{} queued jobs skipped after cancellation", skipped.load(Ordering::SeqCst));

        self.state = if cancelled {
            RunState::Cancelled
        } else {
            RunState::Completed
        };
        acc.outcome.cancelled = cancelled;
        acc.outcome.duration = start.elapsed();
        Ok(acc.outcome)
    }
}

/// Push jobs into the queue until done or cancelled, then close it
fn feed<C>(jobs: Vec<Job<C>>, job_tx: &SyncSender<Job<C>>, token: &CancelToken, cut_short: &AtomicBool) {
    let total = jobs.len();
    for (fed, job) in jobs.into_iter().enumerate() {
        if token.is_cancelled() {
            log::debug!("Feeder stopping: {} jobs not queued", total - fed);
            cut_short.store(true, Ordering::SeqCst);
            return;
        }
        if job_tx.send(job).is_err() {
            return;
        }
    }
}

/// Pull jobs until the queue closes
///
/// After cancellation, queued jobs are drained and dropped so the feeder
/// never blocks on a full queue.
#[allow(clippy::too_many_arguments)]
fn work<C, F>(
    id: usize,
    job_rx: &Mutex<Receiver<Job<C>>>,
    result_tx: &SyncSender<HostOutcome>,
    token: &CancelToken,
    job_fn: &F,
    fail_fast: bool,
    cut_short: &AtomicBool,
    skipped: &AtomicUsize,
) where
    F: Fn(&CancelToken, &Job<C>) -> HostOutcome + Sync,
{
    loop {
        let job = match lock(job_rx).recv() {
            Ok(job) => job,
            Err(_) => break,
        };

        if token.is_cancelled() {
            log::trace!("worker {}: dropping {} after cancellation", id, job.target);
            cut_short.store(true, Ordering::SeqCst);
            skipped.fetch_add(1, Ordering::SeqCst);
            continue;
        }

        log::trace!("worker {}: starting {}", id, job.target);
        let host = job_fn(token, &job);

        if host.interrupted {
            log::debug!("worker {}: {} was interrupted", id, host.target);
            cut_short.store(true, Ordering::SeqCst);
        }
        if fail_fast && !host.success() {
            log::debug!("worker {}: {} failed, cancelling run", id, host.target);
            token.cancel();
        }

        if result_tx.send(host).is_err() {
            break;
        }
    }
    log::trace!("worker {}: exiting", id);
}

/// Drain outcomes into the accumulator, reporting progress outside the lock
fn collect(result_rx: &Receiver<HostOutcome>, shared: &Mutex<Accumulator>, progress: &mut dyn FleetProgress) {
    for host in result_rx {
        let target = host.target.clone();
        let success = host.success();
        let counts = {
            let mut acc = lock(shared);
            acc.counts.add(&host);
            acc.outcome.hosts.push(host);
            acc.counts
        };
        progress.on_host_complete(&target, success, &counts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CheckResult, TargetBatch};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn passing(target: &str) -> HostOutcome {
        let mut batch = TargetBatch::new(target, "spec");
        batch.results.push(CheckResult::passed("check", "ok"));
        HostOutcome::connected(target, vec![batch], Duration::ZERO)
    }

    fn failing(target: &str) -> HostOutcome {
        let mut batch = TargetBatch::new(target, "spec");
        batch.results.push(CheckResult::failed("check", "nope"));
        HostOutcome::connected(target, vec![batch], Duration::ZERO)
    }

    fn jobs(n: usize) -> Vec<Job<()>> {
        (0..n).map(|i| Job::new(format!("host-{i:02}"), ())).collect()
    }

    fn targets(fleet: &FleetOutcome) -> Vec<&str> {
        fleet.hosts.iter().map(|h| h.target.as_str()).collect()
    }

    #[test]
    fn test_empty_jobs_return_immediately() {
        let mut executor = ParallelExecutor::new(4, true, true);
        let start = Instant::now();
        let fleet = executor
            .execute(Vec::<Job<()>>::new(), |_, job| passing(&job.target))
            .unwrap();

        assert!(fleet.hosts.is_empty());
        assert!(!fleet.cancelled);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(executor.state(), RunState::Completed);
    }

    #[test]
    fn test_single_worker_preserves_submission_order() {
        let mut executor = ParallelExecutor::new(1, false, true);
        let fleet = executor
            .execute(vec![Job::new("A", ()), Job::new("B", ())], |_, job| {
                passing(&job.target)
            })
            .unwrap();
        assert_eq!(targets(&fleet), ["A", "B"]);
    }

    #[test]
    fn test_single_worker_runs_sequentially() {
        let mut executor = ParallelExecutor::new(1, false, true);
        let log = Mutex::new(Vec::new());
        let fleet = executor
            .execute(jobs(5), |_, job| {
                log.lock().unwrap().push(job.target.clone());
                passing(&job.target)
            })
            .unwrap();

        let expected: Vec<String> = (0..5).map(|i| format!("host-{i:02}")).collect();
        assert_eq!(*log.lock().unwrap(), expected);
        assert_eq!(targets(&fleet), expected);
    }

    #[test]
    fn test_workers_run_in_parallel() {
        let job_time = Duration::from_millis(100);
        let mut executor = ParallelExecutor::new(5, false, true);
        let start = Instant::now();
        let fleet = executor
            .execute(jobs(10), |_, job| {
                thread::sleep(job_time);
                passing(&job.target)
            })
            .unwrap();

        assert_eq!(fleet.hosts.len(), 10);
        // Sequential would take 1s; five workers need about 200ms.
        assert!(start.elapsed() < job_time * 7, "took {:?}", start.elapsed());
    }

    #[test]
    fn test_every_job_runs_exactly_once() {
        let mut executor = ParallelExecutor::new(4, false, true);
        let seen = Mutex::new(HashMap::new());
        let fleet = executor
            .execute(jobs(50), |_, job| {
                *seen.lock().unwrap().entry(job.target.clone()).or_insert(0) += 1;
                passing(&job.target)
            })
            .unwrap();

        assert_eq!(fleet.hosts.len(), 50);
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 50);
        assert!(seen.values().all(|&n| n == 1));
        assert!(fleet.success());
        assert_eq!(executor.state(), RunState::Completed);
    }

    #[test]
    fn test_more_workers_than_jobs() {
        let mut executor = ParallelExecutor::new(16, false, true);
        let fleet = executor.execute(jobs(3), |_, job| passing(&job.target)).unwrap();

        let mut got = targets(&fleet);
        got.sort_unstable();
        assert_eq!(got, ["host-00", "host-01", "host-02"]);
    }

    #[test]
    fn test_failures_without_fail_fast_run_everything() {
        let mut executor = ParallelExecutor::new(3, false, true);
        let fleet = executor.execute(jobs(9), |_, job| failing(&job.target)).unwrap();

        assert_eq!(fleet.hosts.len(), 9);
        assert!(!fleet.cancelled);
        assert_eq!(fleet.summary().failed_hosts, 9);
    }

    #[test]
    fn test_fail_fast_single_worker_stops_after_first_failure() {
        let mut executor = ParallelExecutor::new(1, true, true);
        let fleet = executor
            .execute(jobs(5), |_, job| {
                if job.target == "host-01" {
                    failing(&job.target)
                } else {
                    passing(&job.target)
                }
            })
            .unwrap();

        assert_eq!(targets(&fleet), ["host-00", "host-01"]);
        assert!(fleet.cancelled);
        assert!(!fleet.success());
        assert_eq!(executor.state(), RunState::Cancelled);
    }

    #[test]
    fn test_fail_fast_cancels_remaining_work() {
        let mut executor = ParallelExecutor::new(4, true, true);
        let fleet = executor
            .execute(jobs(40), |cancel, job| {
                if job.target == "host-00" {
                    return failing(&job.target);
                }
                let outcome = passing(&job.target);
                if cancel.wait(Duration::from_millis(50)) {
                    outcome
                } else {
                    outcome.mark_interrupted()
                }
            })
            .unwrap();

        assert!(fleet.hosts.len() < 40, "collected {}", fleet.hosts.len());
        assert!(fleet.hosts.iter().any(|h| h.target == "host-00"));
        assert!(fleet.cancelled);
        assert!(!fleet.success());

        // Hosts caught mid-job by the failure are reported, never as passed
        let interrupted: Vec<&HostOutcome> = fleet.hosts.iter().filter(|h| h.interrupted).collect();
        assert!(!interrupted.is_empty());
        assert!(interrupted.iter().all(|h| !h.success()));
        assert_eq!(
            fleet.summary().passed_hosts,
            fleet.hosts.iter().filter(|h| !h.interrupted && h.target != "host-00").count()
        );
    }

    #[test]
    fn test_fail_fast_on_last_job_cancels_nothing() {
        let mut executor = ParallelExecutor::new(1, true, true);
        let fleet = executor
            .execute(jobs(3), |_, job| {
                if job.target == "host-02" {
                    failing(&job.target)
                } else {
                    passing(&job.target)
                }
            })
            .unwrap();

        assert_eq!(fleet.hosts.len(), 3);
        assert!(!fleet.cancelled);
        assert!(!fleet.success());
        assert_eq!(executor.state(), RunState::Completed);
    }

    #[test]
    fn test_deadline_during_last_job_is_reported() {
        let mut executor =
            ParallelExecutor::new(1, false, true).with_timeout(Duration::from_millis(100));
        let fleet = executor
            .execute(jobs(1), |cancel, job| {
                let outcome = passing(&job.target);
                if cancel.wait(Duration::from_secs(30)) {
                    outcome
                } else {
                    outcome.mark_interrupted()
                }
            })
            .unwrap();

        assert_eq!(fleet.hosts.len(), 1);
        assert!(fleet.cancelled);
        assert!(!fleet.success());
        assert_eq!(fleet.summary().passed_hosts, 0);
        assert_eq!(executor.state(), RunState::Cancelled);
    }

    #[test]
    fn test_connection_failure_triggers_fail_fast() {
        let mut executor = ParallelExecutor::new(1, true, true);
        let fleet = executor
            .execute(jobs(3), |_, job| {
                HostOutcome::connection_failed(&job.target, "connection refused", Duration::ZERO)
            })
            .unwrap();

        assert_eq!(fleet.hosts.len(), 1);
        assert_eq!(fleet.summary().connection_errors, 1);
    }

    #[test]
    fn test_job_fn_sees_cancellation() {
        let mut executor = ParallelExecutor::new(2, true, true);
        let interrupted = AtomicUsize::new(0);
        let waiting = AtomicBool::new(false);
        let start = Instant::now();
        let fleet = executor
            .execute(jobs(2), |cancel, job| {
                if job.target == "host-00" {
                    while !waiting.load(Ordering::SeqCst) {
                        thread::sleep(Duration::from_millis(5));
                    }
                    return failing(&job.target);
                }
                waiting.store(true, Ordering::SeqCst);
                if !cancel.wait(Duration::from_secs(30)) {
                    interrupted.fetch_add(1, Ordering::SeqCst);
                }
                passing(&job.target)
            })
            .unwrap();

        assert_eq!(fleet.hosts.len(), 2);
        assert_eq!(interrupted.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_timeout_stops_feeding() {
        let mut executor =
            ParallelExecutor::new(1, false, true).with_timeout(Duration::from_millis(100));
        let fleet = executor
            .execute(jobs(20), |_, job| {
                thread::sleep(Duration::from_millis(40));
                passing(&job.target)
            })
            .unwrap();

        assert!(fleet.hosts.len() < 20);
        assert!(fleet.cancelled);
        assert!(!fleet.success());
    }

    #[test]
    fn test_pre_cancelled_token_runs_nothing() {
        let token = CancelToken::new();
        token.cancel();
        let calls = AtomicUsize::new(0);
        let mut executor = ParallelExecutor::new(2, false, true).with_cancel_token(token);
        let fleet = executor
            .execute(jobs(6), |_, job| {
                calls.fetch_add(1, Ordering::SeqCst);
                passing(&job.target)
            })
            .unwrap();

        assert!(fleet.hosts.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(fleet.cancelled);
    }

    struct Recording(Arc<Mutex<Vec<(String, bool, ProgressCounts)>>>);

    impl FleetProgress for Recording {
        fn on_host_complete(&mut self, target: &str, success: bool, counts: &ProgressCounts) {
            self.0
                .lock()
                .unwrap()
                .push((target.to_string(), success, *counts));
        }
    }

    #[test]
    fn test_progress_reports_running_totals() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut executor = ParallelExecutor::new(1, false, false)
            .with_progress(Box::new(Recording(events.clone())));
        executor
            .execute(
                vec![Job::new("a", ()), Job::new("b", ()), Job::new("c", ())],
                |_, job| match job.target.as_str() {
                    "a" => passing("a"),
                    "b" => failing("b"),
                    _ => HostOutcome::connection_failed("c", "no route to host", Duration::ZERO),
                },
            )
            .unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].0, "a");
        assert!(events[0].1);
        assert_eq!(
            events[2].2,
            ProgressCounts {
                total: 3,
                completed: 3,
                passed: 1,
                failed: 2,
                connection_errors: 1,
            }
        );
    }

    #[test]
    fn test_worker_count_is_clamped() {
        assert_eq!(ParallelExecutor::new(0, false, false).workers(), 1);
        assert_eq!(ParallelExecutor::new(0, false, false).state(), RunState::Idle);
    }
}
