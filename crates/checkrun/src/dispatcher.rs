//! Single-target dispatcher - runs every declared check against one provider
//!
//! Domains run in the order their handlers were registered. That order is
//! part of the contract: with fail-fast enabled it decides which checks
//! never run.

use crate::cancel::CancelToken;
use crate::handler::{BoxedHandler, CheckHandler, FailFastPolicy, Spec};
use crate::provider::{Provider, ResultSink};
use crate::types::{CheckResult, Status, TargetBatch};
use anyhow::Result;
use std::ops::ControlFlow;
use std::time::Instant;

/// Accumulates the results of one batch
///
/// Handed to every [`CheckHandler`]. Enforces the fail-fast policy, streams
/// each result to the sink as soon as it is recorded, and observes the
/// cancellation token between checks.
pub struct Recorder<'a> {
    results: Vec<CheckResult>,
    policy: FailFastPolicy,
    sink: Option<&'a mut dyn ResultSink>,
    cancel: Option<&'a CancelToken>,
    stopped: bool,
    interrupted: bool,
}

impl<'a> Recorder<'a> {
    fn new(
        policy: FailFastPolicy,
        sink: Option<&'a mut dyn ResultSink>,
        cancel: Option<&'a CancelToken>,
    ) -> Self {
        Self {
            results: Vec::new(),
            policy,
            sink,
            cancel,
            stopped: false,
            interrupted: false,
        }
    }

    /// Record a finished result
    ///
    /// Returns `Break` when no further checks may run. Once stopped, further
    /// records are dropped so the batch always ends at the check that
    /// stopped it.
    pub fn record(&mut self, result: CheckResult) -> ControlFlow<()> {
        if self.stopped {
            log::warn!("Dropping result '{}' recorded after stop", result.name);
            return ControlFlow::Break(());
        }

        let stop = match self.policy {
            FailFastPolicy::Disabled => false,
            FailFastPolicy::OnFailure => result.status == Status::Failed,
            FailFastPolicy::OnFailureOrError => {
                matches!(result.status, Status::Failed | Status::Errored)
            }
        };

        if let Some(sink) = self.sink.as_mut() {
            sink.on_result(&result);
        }
        if stop {
            log::debug!("Fail-fast triggered by '{}'", result.name);
            self.stopped = true;
        }
        self.results.push(result);

        self.next()
    }

    /// Run one check and record its result
    ///
    /// The closure's duration is measured and stored on the result. An `Err`
    /// from the closure becomes an `Errored` result named `name`, unless the
    /// token fired meanwhile: then the check never finished, nothing is
    /// recorded and the batch is interrupted. An `Ok` result keeps its own
    /// name, or takes `name` when it has none.
    pub fn check<F>(&mut self, name: impl Into<String>, f: F) -> ControlFlow<()>
    where
        F: FnOnce() -> Result<CheckResult>,
    {
        self.next()?;

        let name = name.into();
        let start = Instant::now();
        let result = match f() {
            Ok(mut result) => {
                if result.name.is_empty() {
                    result.name = name;
                }
                result
            }
            Err(e) if self.cancel.is_some_and(CancelToken::is_cancelled) => {
                log::debug!("'{}' cut short by cancellation: {:#}", name, e);
                self.stopped = true;
                self.interrupted = true;
                return ControlFlow::Break(());
            }
            Err(e) => CheckResult::errored(name, format!("{e:#}")),
        };
        self.record(result.with_duration(start.elapsed()))
    }

    /// Whether the next check may start
    pub fn next(&mut self) -> ControlFlow<()> {
        if self.stopped {
            return ControlFlow::Break(());
        }
        if self.cancel.is_some_and(CancelToken::is_cancelled) {
            log::debug!("Batch interrupted by cancellation");
            self.stopped = true;
            self.interrupted = true;
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn results(&self) -> &[CheckResult] {
        &self.results
    }
}

/// Optional parts of a dispatch
#[derive(Default)]
pub struct DispatchOptions<'a> {
    /// Receives each result as it is produced
    pub sink: Option<&'a mut dyn ResultSink>,
    /// Stops the batch between checks once fired
    pub cancel: Option<&'a CancelToken>,
}

/// Runs a spec against one provider through an ordered list of handlers
pub struct Dispatcher<S> {
    handlers: Vec<BoxedHandler<S>>,
}

impl<S: Spec> Dispatcher<S> {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Append a handler; registration order is execution order
    pub fn register(mut self, handler: impl CheckHandler<S> + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn push(&mut self, handler: BoxedHandler<S>) {
        self.handlers.push(handler);
    }

    /// Registered domains in execution order
    pub fn domains(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.domain()).collect()
    }

    /// Run every declared check
    pub fn execute(&self, target: &str, spec: &S, provider: &dyn Provider) -> TargetBatch {
        self.execute_with(target, spec, provider, DispatchOptions::default())
    }

    /// Run every declared check, streaming results and honoring cancellation
    pub fn execute_with(
        &self,
        target: &str,
        spec: &S,
        provider: &dyn Provider,
        opts: DispatchOptions<'_>,
    ) -> TargetBatch {
        let start = Instant::now();
        let mut batch = TargetBatch::new(target, spec.name());
        let standalone;
        let cancel = match opts.cancel {
            Some(cancel) => cancel,
            None => {
                standalone = CancelToken::new();
                &standalone
            }
        };
        let mut recorder = Recorder::new(spec.fail_fast(), opts.sink, opts.cancel);

        for handler in &self.handlers {
            if handler.is_empty(spec) {
                log::trace!("{}: nothing declared for {}", target, handler.domain());
                continue;
            }
            if recorder.next().is_break() {
                break;
            }

            log::debug!("{}: running {} checks", target, handler.domain());
            if handler.run(cancel, spec, provider, &mut recorder).is_break() || recorder.is_stopped() {
                break;
            }
        }

        batch.interrupted = recorder.interrupted;
        batch.results = recorder.results;
        batch.duration = start.elapsed();
        batch
    }
}

impl<S: Spec> Default for Dispatcher<S> {
    fn default() -> Self {
        Self::new()
    }
}
