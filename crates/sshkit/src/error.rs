//! Error types for connecting to and running commands on hosts.
//!
//! Variants keep the underlying `std::io::Error` as their source so the
//! classifier can look at real OS error codes instead of message text.

use crate::classify::{self, Verdict};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while reaching a host.
#[derive(Debug, Error)]
pub enum Error {
    /// Host name could not be resolved
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        /// Host as given by the caller
        host: String,
        /// Resolver error
        #[source]
        source: io::Error,
    },

    /// Resolution succeeded but returned no address
    #[error("no address found for {host}")]
    NoAddress {
        /// Host as given by the caller
        host: String,
    },

    /// TCP connection to the host failed
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Socket address that was dialled
        addr: String,
        /// Socket error
        #[source]
        source: io::Error,
    },

    /// The operation did not finish within its timeout
    #[error("connection to {host} timed out after {}s", .timeout.as_secs())]
    Timeout {
        /// Host being contacted
        host: String,
        /// Timeout that expired
        timeout: Duration,
    },

    /// The ssh client itself failed (exit status 255)
    #[error("ssh to {host} failed: {stderr}")]
    Ssh {
        /// Destination passed to ssh
        host: String,
        /// ssh client stderr, trimmed
        stderr: String,
    },

    /// A local program could not be started
    #[error("failed to execute {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Spawn error
        #[source]
        source: io::Error,
    },

    /// The caller asked to stop while a command was running; it was killed
    #[error("interrupted while running {program}")]
    Interrupted {
        /// Program that was killed
        program: String,
    },

    /// Target string could not be parsed
    #[error("invalid target '{target}': {reason}")]
    InvalidTarget {
        /// Target as given
        target: String,
        /// What is wrong with it
        reason: String,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Classifier verdict for this error and its sources.
    pub fn verdict(&self) -> Verdict {
        classify::classify(self)
    }

    /// Whether retrying the same operation is sensible.
    pub fn is_retryable(&self) -> bool {
        self.verdict() == Verdict::Retryable
    }

    /// Whether the error is known to be permanent.
    pub fn is_non_retryable(&self) -> bool {
        self.verdict() == Verdict::NonRetryable
    }
}

/// Result type for sshkit operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_refused_is_retryable() {
        let err = Error::Connect {
            addr: "10.0.0.1:22".to_string(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert!(err.is_retryable());
        assert!(!err.is_non_retryable());
    }

    #[test]
    fn test_timeout_is_retryable() {
        let err = Error::Timeout {
            host: "web1".to_string(),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(err.to_string(), "connection to web1 timed out after 10s");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_ssh_auth_failure_is_permanent() {
        let err = Error::Ssh {
            host: "deploy@web1".to_string(),
            stderr: "deploy@web1: Permission denied (publickey).".to_string(),
        };
        assert!(err.is_non_retryable());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_interrupted_is_never_retried() {
        let err = Error::Interrupted {
            program: "ssh".to_string(),
        };
        assert_eq!(err.verdict(), Verdict::Unknown);
        assert!(!crate::classify::should_retry(&err));
    }

    #[test]
    fn test_invalid_target_is_unknown() {
        let err = Error::InvalidTarget {
            target: "a:b:c".to_string(),
            reason: "bad port".to_string(),
        };
        assert_eq!(err.verdict(), Verdict::Unknown);
    }
}
