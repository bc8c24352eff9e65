//! Provider and sink traits
//!
//! These traits keep the engine free of any particular transport or UI:
//! the caller supplies how commands reach a target ([`Provider`]) and
//! where finished checks are reported as they happen ([`ResultSink`]).

use crate::cancel::CancelToken;
use crate::types::CheckResult;
use anyhow::Result;
use serde::Serialize;

/// Output of a command run through a [`Provider`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Trimmed stdout
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

/// Executes command strings against one target
///
/// `Err` means the command could not be run at all (spawn failure, lost
/// connection). A command that ran and exited non-zero is `Ok` with a
/// non-zero `exit_code`.
///
/// `cancel` is the run's token: a provider should stop a command that is
/// still running once it fires and return an error.
///
/// A provider is reused sequentially by one dispatcher; it is never called
/// concurrently, so implementations need not be `Sync`.
pub trait Provider: Send {
    /// Run a command string and capture its output
    fn execute_command(&self, cancel: &CancelToken, command: &str) -> Result<CommandOutput>;

    /// Run a command and return just success/failure
    fn run_status(&self, cancel: &CancelToken, command: &str) -> Result<bool> {
        Ok(self.execute_command(cancel, command)?.success())
    }

    /// Run a command and capture trimmed stdout, erroring on non-zero exit
    fn run_capture(&self, cancel: &CancelToken, command: &str) -> Result<String> {
        let output = self.execute_command(cancel, command)?;
        if !output.success() {
            anyhow::bail!(
                "`{}` exited with {}: {}",
                command,
                output.exit_code,
                output.stderr.trim()
            );
        }
        Ok(output.stdout_trimmed().to_string())
    }
}

impl<P: Provider + Sync + ?Sized> Provider for &P {
    fn execute_command(&self, cancel: &CancelToken, command: &str) -> Result<CommandOutput> {
        (**self).execute_command(cancel, command)
    }
}

impl<P: Provider + ?Sized> Provider for Box<P> {
    fn execute_command(&self, cancel: &CancelToken, command: &str) -> Result<CommandOutput> {
        (**self).execute_command(cancel, command)
    }
}

/// Receives each check result the moment it is produced
///
/// Runs synchronously on the dispatch path, so implementations must return
/// quickly.
pub trait ResultSink {
    fn on_result(&mut self, result: &CheckResult);
}

impl<F: FnMut(&CheckResult)> ResultSink for F {
    fn on_result(&mut self, result: &CheckResult) {
        self(result);
    }
}

/// No-op sink
pub struct NoSink;

impl ResultSink for NoSink {
    fn on_result(&mut self, _result: &CheckResult) {}
}
