//! # sshkit
//!
//! Reaching machines over ssh and deciding what to do when that fails.
//!
//! ## Features
//!
//! - Classify connection errors as retryable, permanent or unknown
//! - Retry with exponential backoff, interruptible between attempts
//! - Run commands locally (`sh -c`) or through the system `ssh` client
//! - Parse `[user@]host[:port]` targets
//!
//! ## Example
//!
//! ```ignore
//! use sshkit::{RetryConfig, Session, SshOptions, SshSession, with_retry_blocking};
//!
//! let target = "deploy@web1:2222".parse()?;
//! let session = with_retry_blocking(&RetryConfig::default(), |_| {
//!     SshSession::connect(&target, &SshOptions::default())
//! })?;
//! let out = session.run("uname -s")?;
//! ```

pub mod backend;
pub mod classify;
pub mod error;
pub mod retry;
pub mod target;

pub use backend::{HostKeyPolicy, LocalShell, Output, Session, SshOptions, SshSession};
pub use classify::{
    Classification, Family, Verdict, classify, classify_detailed, is_non_retryable, is_retryable,
    should_retry,
};
pub use error::{Error, Result};
pub use retry::{LogCallback, NoCallback, RetryCallback, RetryConfig, with_retry, with_retry_blocking};
pub use target::{SshTarget, Target};
