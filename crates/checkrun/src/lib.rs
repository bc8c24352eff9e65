//! # checkrun
//!
//! Engine for running declared checks against machines.
//!
//! The crate knows how to sequence checks and fan work out across hosts,
//! but nothing about what any check means or how commands reach a host.
//!
//! ## Core Concepts
//!
//! - **Provider**: runs a command string on one target
//! - **CheckHandler**: one domain of checks (packages, files, ...) behind a single trait
//! - **Dispatcher**: runs every registered handler against one provider, in a
//!   fixed order, with fail-fast and live result streaming
//! - **ParallelExecutor**: runs per-host jobs on a bounded worker pool with
//!   fail-fast cancellation and a live status line
//! - **CancelToken**: cooperative cancellation shared by one run
//!
//! ## Example
//!
//! ```ignore
//! use checkrun::{Dispatcher, HostOutcome, Job, ParallelExecutor};
//!
//! let dispatcher = Dispatcher::new()
//!     .register(Packages)
//!     .register(Services);
//!
//! let jobs = hosts.iter().map(|h| Job::new(h.clone(), ())).collect();
//! let mut executor = ParallelExecutor::new(8, spec_fail_fast, false);
//! let fleet = executor.execute(jobs, |cancel, job| {
//!     let start = std::time::Instant::now();
//!     match connect(&job.target, cancel) {
//!         Ok(provider) => {
//!             let batch = dispatcher.execute(&job.target, &spec, &provider);
//!             HostOutcome::connected(&job.target, vec![batch], start.elapsed())
//!         }
//!         Err(e) => HostOutcome::connection_failed(&job.target, e.to_string(), start.elapsed()),
//!     }
//! })?;
//!
//! println!("{:?}", fleet.summary());
//! ```

pub mod cancel;
pub mod dispatcher;
pub mod handler;
pub mod parallel;
pub mod progress;
pub mod provider;
pub mod types;

// Re-export main types at crate root
pub use cancel::CancelToken;
pub use dispatcher::{DispatchOptions, Dispatcher, Recorder};
pub use handler::{BoxedHandler, CheckHandler, FailFastPolicy, Spec};
pub use parallel::{ParallelExecutor, RunState};
pub use progress::{FleetProgress, NoFleetProgress, ProgressCounts, StatusLine};
pub use provider::{CommandOutput, NoSink, Provider, ResultSink};
pub use types::{
    BatchSummary, CheckResult, FleetOutcome, FleetSummary, HostOutcome, Job, Status, TargetBatch,
};
