//! Connecting to targets and adapting sessions to the check engine

use anyhow::Result;
use checkrun::{CancelToken, CommandOutput, Provider};
use sshkit::{
    Error, LocalShell, LogCallback, RetryConfig, Session, SshOptions, SshSession, SshTarget, Target,
};

/// Runs checks through an sshkit [`Session`]
pub struct SessionProvider<S> {
    session: S,
}

impl<S: Session> SessionProvider<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }
}

impl<S: Session> Provider for SessionProvider<S> {
    /// Runs `command`, killing it if `cancel` fires first
    fn execute_command(&self, cancel: &CancelToken, command: &str) -> Result<CommandOutput> {
        let out = self.session.run_until(command, &|| cancel.is_cancelled())?;
        Ok(CommandOutput::new(out.stdout, out.stderr, out.exit_code))
    }
}

/// A session and the number of connection attempts it took
pub struct Connected {
    pub session: Box<dyn Session>,
    pub attempts: u32,
}

/// Why a target could not be reached
pub struct ConnectFailure {
    pub error: Error,
    pub attempts: u32,
}

impl ConnectFailure {
    /// Error text with the classifier's advice appended when it recognised the error
    pub fn message(&self) -> String {
        match sshkit::classify_detailed(&self.error).family {
            Some(family) if self.attempts > 1 => format!(
                "{} (after {} attempts; {})",
                self.error,
                self.attempts,
                family.advice()
            ),
            Some(family) => format!("{} ({})", self.error, family.advice()),
            None => self.error.to_string(),
        }
    }
}

/// Open a session, retrying transient failures
///
/// Backoff sleeps wait on `cancel`, so cancelling the run interrupts a host
/// that is between attempts.
pub fn connect(
    target: &Target,
    ssh: &SshOptions,
    retry: &RetryConfig,
    cancel: &CancelToken,
) -> Result<Connected, ConnectFailure> {
    let ssh_target: &SshTarget = match target {
        Target::Local => {
            return Ok(Connected {
                session: Box::new(LocalShell),
                attempts: 1,
            });
        }
        Target::Ssh(t) => t,
    };

    let host = ssh_target.to_string();
    let callback = LogCallback { host: &host };
    let mut attempts = 0;

    let result = sshkit::with_retry(
        retry,
        Some(&callback),
        |delay| cancel.wait(delay),
        |attempt| {
            attempts = attempt;
            if cancel.is_cancelled() {
                return Err(Error::Other("cancelled before connecting".to_string()));
            }
            SshSession::connect(ssh_target, ssh)
        },
    );

    match result {
        Ok(session) => Ok(Connected {
            session: Box::new(session),
            attempts,
        }),
        Err(error) => {
            log::debug!("{}: giving up after {} attempts: {}", host, attempts, error);
            Err(ConnectFailure { error, attempts })
        }
    }
}
