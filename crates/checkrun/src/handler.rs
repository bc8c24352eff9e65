//! Check handler trait
//!
//! A handler owns one domain of checks (packages, files, services, ...).
//! The dispatcher never looks inside a domain: it hands each handler the
//! run's cancel token, the spec, a provider, and a [`Recorder`], and the
//! handler records one result per declared check.

use crate::cancel::CancelToken;
use crate::dispatcher::Recorder;
use crate::provider::Provider;
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;

/// When a batch stops early
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailFastPolicy {
    /// Run every check
    #[default]
    Disabled,
    /// Stop after the first `Failed` check. `Errored` checks don't stop the batch.
    OnFailure,
    /// Stop after the first `Failed` or `Errored` check
    OnFailureOrError,
}

impl FailFastPolicy {
    pub fn from_flags(fail_fast: bool, fail_on_error: bool) -> Self {
        match (fail_fast, fail_on_error) {
            (false, _) => Self::Disabled,
            (true, false) => Self::OnFailure,
            (true, true) => Self::OnFailureOrError,
        }
    }

    pub fn is_enabled(self) -> bool {
        self != Self::Disabled
    }
}

/// A parsed document of declared checks
pub trait Spec: Send + Sync {
    /// Name reported on the resulting batch
    fn name(&self) -> &str;

    /// Fail-fast policy declared by the spec
    fn fail_fast(&self) -> FailFastPolicy {
        FailFastPolicy::Disabled
    }
}

/// One domain of checks
///
/// Implementations must record exactly one result per declared check, in
/// declaration order, and return as soon as [`Recorder::check`] (or
/// [`Recorder::record`]) yields `ControlFlow::Break`.
///
/// # Example
///
/// ```ignore
/// struct Packages;
///
/// impl CheckHandler<MySpec> for Packages {
///     fn domain(&self) -> &'static str {
///         "packages"
///     }
///
///     fn is_empty(&self, spec: &MySpec) -> bool {
///         spec.packages.is_empty()
///     }
///
///     fn run(
///         &self,
///         cancel: &CancelToken,
///         spec: &MySpec,
///         provider: &dyn Provider,
///         recorder: &mut Recorder<'_>,
///     ) -> ControlFlow<()> {
///         for pkg in &spec.packages {
///             recorder.check(format!("package:{}", pkg.name), || {
///                 let installed = provider.run_status(cancel, &format!("dpkg -s {}", pkg.name))?;
///                 Ok(CheckResult::from_bool("", installed, "installed", "not installed"))
///             })?;
///         }
///         ControlFlow::Continue(())
///     }
/// }
/// ```
pub trait CheckHandler<S>: Send + Sync {
    /// Domain name, used for logging and error messages
    fn domain(&self) -> &'static str;

    /// Whether the spec declares nothing for this domain
    fn is_empty(&self, _spec: &S) -> bool {
        false
    }

    /// Run every check of this domain declared in `spec`
    ///
    /// `cancel` is passed on to every provider call so a running command
    /// can be stopped.
    fn run(
        &self,
        cancel: &CancelToken,
        spec: &S,
        provider: &dyn Provider,
        recorder: &mut Recorder<'_>,
    ) -> ControlFlow<()>;
}

/// A boxed handler for type-erased storage
pub type BoxedHandler<S> = Box<dyn CheckHandler<S>>;
