//! Connection error classification.
//!
//! Decides whether a failure to reach or authenticate with a host is worth
//! retrying. Checks run in a fixed order so an error carrying several cues
//! always gets the same verdict:
//!
//! 1. OS-level network error codes anywhere in the source chain (refused,
//!    reset, timed out, unreachable) and sshkit timeouts: retryable.
//! 2. Permanent phrases (authentication, local configuration, name
//!    resolution, host identity): non-retryable.
//! 3. Transient phrases (reset by peer, broken pipe, EOF, ...): retryable.
//! 4. Anything else: unknown. Callers should not retry unknown errors.
//!
//! Phrase matching is case-sensitive against the literal strings printed by
//! the transport. The tables carry both the Go `x/crypto/ssh` wording and
//! the OpenSSH client wording, since the `ssh` binary is this crate's
//! transport.
//!
//! Two matches are deliberately broad and known to be heuristics: any `EOF`
//! is transient, and any `permission denied` is an authentication failure
//! (even a filesystem permission error will match).

use std::error::Error as StdError;
use std::io;

/// Classifier verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Transient; retrying may succeed
    Retryable,
    /// Permanent; retrying cannot succeed
    NonRetryable,
    /// Not recognised
    Unknown,
}

/// Which kind of cue produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// Network-level failure (retryable)
    Network,
    /// Credentials rejected
    Authentication,
    /// Local key or known-hosts file problem
    Configuration,
    /// Host name does not resolve
    Resolution,
    /// Host key does not match what is known
    HostIdentity,
}

impl Family {
    /// The verdict every error of this family gets.
    pub fn verdict(&self) -> Verdict {
        match self {
            Self::Network => Verdict::Retryable,
            _ => Verdict::NonRetryable,
        }
    }

    /// Get a user-friendly description of this family.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Authentication => "Authentication failed",
            Self::Configuration => "Local SSH configuration problem",
            Self::Resolution => "Host name could not be resolved",
            Self::HostIdentity => "Host key verification failed",
        }
    }

    /// Get actionable advice for resolving errors of this family.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check that the host is up and reachable, then try again",
            Self::Authentication => "Check the user name, key and that the key is authorized on the host",
            Self::Configuration => "Check the identity file path, its format and passphrase",
            Self::Resolution => "Check the host name or use an IP address",
            Self::HostIdentity => "Verify the host key and update known_hosts if the change is expected",
        }
    }
}

/// Verdict together with the cue that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Retry verdict
    pub verdict: Verdict,
    /// Family of the matched cue, `None` when unknown
    pub family: Option<Family>,
}

impl Classification {
    const UNKNOWN: Self = Self {
        verdict: Verdict::Unknown,
        family: None,
    };

    fn of(family: Family) -> Self {
        Self {
            verdict: family.verdict(),
            family: Some(family),
        }
    }
}

/// A cue matches when every fragment appears in the message.
type Cue = &'static [&'static str];

const AUTHENTICATION: &[Cue] = &[
    &["unable to authenticate"],
    &["permission denied"],
    &["Permission denied"],
    &["handshake failed", "authenticat"],
    &["no supported methods remain"],
    &["Too many authentication failures"],
];

const CONFIGURATION: &[Cue] = &[
    &["failed to read private key"],
    &["failed to parse private key"],
    &["ssh: no key found"],
    &["Load key", "invalid format"],
    &["Load key", "error in libcrypto"],
    &["private key", "no such file or directory"],
    &["no such identity"],
    &["Identity file", "not accessible"],
    &["known_hosts", "no such file or directory"],
    &["knownhosts", "no such file or directory"],
    &["this private key is passphrase protected"],
    &["cannot decode encrypted private keys"],
    &["incorrect passphrase supplied"],
];

const RESOLUTION: &[Cue] = &[
    &["no such host"],
    &["Name or service not known"],
    &["name or service not known"],
    &["nodename nor servname provided"],
    &["servname not supported"],
    &["Could not resolve hostname"],
];

const HOST_IDENTITY: &[Cue] = &[
    &["Host key verification failed"],
    &["host key verification failed"],
    &["knownhosts: key mismatch"],
    &["key mismatch"],
    &["REMOTE HOST IDENTIFICATION HAS CHANGED"],
    &["knownhosts: key is unknown"],
];

const TRANSIENT: &[Cue] = &[
    &["connection reset by peer"],
    &["Connection reset by peer"],
    &["broken pipe"],
    &["Broken pipe"],
    &["i/o timeout"],
    &["connection refused"],
    &["Connection refused"],
    &["no route to host"],
    &["No route to host"],
    &["network is unreachable"],
    &["Network is unreachable"],
    &["connection timed out"],
    &["Connection timed out"],
    &["failed to create session"],
    &["administratively prohibited"],
    &["kex_exchange_identification"],
    &["Connection closed by"],
    &["EOF"],
];

/// Permanent families, in evaluation order.
const PERMANENT: &[(Family, &[Cue])] = &[
    (Family::Authentication, AUTHENTICATION),
    (Family::Configuration, CONFIGURATION),
    (Family::Resolution, RESOLUTION),
    (Family::HostIdentity, HOST_IDENTITY),
];

/// Iterate an error and its sources.
fn chain<'a>(err: &'a (dyn StdError + 'static)) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |&e| e.source())
}

fn is_network_io(err: &io::Error) -> bool {
    use io::ErrorKind::{
        BrokenPipe, ConnectionAborted, ConnectionRefused, ConnectionReset, HostUnreachable,
        NetworkUnreachable, TimedOut, UnexpectedEof,
    };

    if matches!(
        err.kind(),
        ConnectionRefused
            | ConnectionReset
            | ConnectionAborted
            | TimedOut
            | HostUnreachable
            | NetworkUnreachable
            | BrokenPipe
            | UnexpectedEof
    ) {
        return true;
    }

    matches!(
        err.raw_os_error(),
        Some(
            libc::ECONNREFUSED
                | libc::ECONNRESET
                | libc::ECONNABORTED
                | libc::ETIMEDOUT
                | libc::EHOSTUNREACH
                | libc::ENETUNREACH
                | libc::EPIPE
        )
    )
}

fn is_network_level(err: &(dyn StdError + 'static)) -> bool {
    if let Some(io_err) = err.downcast_ref::<io::Error>() {
        return is_network_io(io_err);
    }
    matches!(
        err.downcast_ref::<crate::Error>(),
        Some(crate::Error::Timeout { .. })
    )
}

fn matches_any(message: &str, cues: &[Cue]) -> bool {
    cues.iter()
        .any(|cue| cue.iter().all(|fragment| message.contains(fragment)))
}

/// Classify a message on its own (no error chain available).
pub fn classify_message(message: &str) -> Classification {
    for (family, cues) in PERMANENT {
        if matches_any(message, cues) {
            return Classification::of(*family);
        }
    }
    if matches_any(message, TRANSIENT) {
        return Classification::of(Family::Network);
    }
    Classification::UNKNOWN
}

/// Classify an error, walking its whole source chain.
pub fn classify_detailed(err: &(dyn StdError + 'static)) -> Classification {
    if chain(err).any(is_network_level) {
        return Classification::of(Family::Network);
    }

    let messages: Vec<String> = chain(err).map(ToString::to_string).collect();
    for (family, cues) in PERMANENT {
        if messages.iter().any(|m| matches_any(m, cues)) {
            return Classification::of(*family);
        }
    }
    if messages.iter().any(|m| matches_any(m, TRANSIENT)) {
        return Classification::of(Family::Network);
    }
    Classification::UNKNOWN
}

/// Classify an error, walking its whole source chain.
pub fn classify(err: &(dyn StdError + 'static)) -> Verdict {
    let classification = classify_detailed(err);
    log::trace!("classified '{}' as {:?}", err, classification);
    classification.verdict
}

/// True when retrying is sensible. `None` is never retryable.
pub fn is_retryable(err: Option<&(dyn StdError + 'static)>) -> bool {
    err.is_some_and(|e| classify(e) == Verdict::Retryable)
}

/// True when the error is known to be permanent. `None` is never permanent.
pub fn is_non_retryable(err: Option<&(dyn StdError + 'static)>) -> bool {
    err.is_some_and(|e| classify(e) == Verdict::NonRetryable)
}

/// Retry policy: only errors positively known to be transient are retried.
pub fn should_retry(err: &(dyn StdError + 'static)) -> bool {
    classify(err) == Verdict::Retryable
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    /// Wraps another error, Display without the source (like most libraries).
    #[derive(Debug)]
    struct Wrapped {
        context: &'static str,
        source: Box<dyn StdError + Send + Sync>,
    }

    impl fmt::Display for Wrapped {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.context)
        }
    }

    impl StdError for Wrapped {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(self.source.as_ref())
        }
    }

    fn wrap(context: &'static str, source: impl StdError + Send + Sync + 'static) -> Wrapped {
        Wrapped {
            context,
            source: Box::new(source),
        }
    }

    fn msg(message: &str) -> io::Error {
        io::Error::other(message.to_string())
    }

    fn both(err: &(dyn StdError + 'static)) -> (bool, bool) {
        (is_retryable(Some(err)), is_non_retryable(Some(err)))
    }

    #[test]
    fn test_none_is_neither() {
        assert!(!is_retryable(None));
        assert!(!is_non_retryable(None));
    }

    #[test]
    fn test_wrapped_network_codes_are_retryable() {
        for kind in [
            io::ErrorKind::ConnectionRefused,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::TimedOut,
            io::ErrorKind::HostUnreachable,
            io::ErrorKind::NetworkUnreachable,
        ] {
            let err = wrap("dial tcp 10.0.0.1:22", io::Error::from(kind));
            assert_eq!(both(&err), (true, false), "{kind:?}");
        }
    }

    #[test]
    fn test_raw_os_codes_are_retryable() {
        for code in [libc::ECONNREFUSED, libc::EHOSTUNREACH, libc::ETIMEDOUT] {
            let err = wrap("connect", io::Error::from_raw_os_error(code));
            assert!(is_retryable(Some(&err)), "errno {code}");
        }
    }

    #[test]
    fn test_network_code_wins_over_unrelated_phrase() {
        // Context text mentions a permanent phrase; the refused socket decides.
        let err = wrap(
            "permission denied while probing",
            io::Error::from(io::ErrorKind::ConnectionRefused),
        );
        assert_eq!(both(&err), (true, false));
    }

    #[test]
    fn test_transient_phrases() {
        for text in [
            "read tcp 10.0.0.5:51234->10.0.0.1:22: read: connection reset by peer",
            "write: broken pipe",
            "dial tcp 10.0.0.1:22: i/o timeout",
            "ssh: connect to host web1 port 22: Connection refused",
            "ssh: connect to host web1 port 22: No route to host",
            "ssh: connect to host web1 port 22: Network is unreachable",
            "ssh: connect to host web1 port 22: Connection timed out",
            "failed to create session: ssh: unexpected packet",
            "ssh: rejected: administratively prohibited (open failed)",
            "kex_exchange_identification: Connection closed by remote host",
            "EOF",
        ] {
            assert_eq!(both(&msg(text)), (true, false), "{text}");
        }
    }

    #[test]
    fn test_authentication_phrases() {
        for text in [
            "ssh: handshake failed: ssh: unable to authenticate, attempted methods [none publickey], no supported methods remain",
            "deploy@web1: Permission denied (publickey,password).",
            "sftp: permission denied",
            "Received disconnect from 10.0.0.1 port 22:2: Too many authentication failures",
        ] {
            let c = classify_detailed(&msg(text));
            assert_eq!(c.verdict, Verdict::NonRetryable, "{text}");
            assert_eq!(c.family, Some(Family::Authentication), "{text}");
        }
    }

    #[test]
    fn test_configuration_phrases() {
        for text in [
            "failed to parse private key: ssh: no key found",
            "Load key \"/home/me/.ssh/id_ed25519\": invalid format",
            "open /home/me/.ssh/id_rsa: no such file or directory (private key)",
            "knownhosts: open /home/me/.ssh/known_hosts: no such file or directory",
            "ssh: this private key is passphrase protected",
            "Warning: Identity file /nope not accessible: No such file or directory.",
        ] {
            let c = classify_detailed(&msg(text));
            assert_eq!(c.family, Some(Family::Configuration), "{text}");
            assert_eq!(both(&msg(text)), (false, true), "{text}");
        }
    }

    #[test]
    fn test_resolution_phrases() {
        for text in [
            "dial tcp: lookup web9.example: no such host",
            "failed to lookup address information: Name or service not known",
            "failed to lookup address information: nodename nor servname provided, or not known",
            "ssh: Could not resolve hostname web9: Name or service not known",
        ] {
            let c = classify_detailed(&msg(text));
            assert_eq!(c.family, Some(Family::Resolution), "{text}");
            assert_eq!(both(&msg(text)), (false, true), "{text}");
        }
    }

    #[test]
    fn test_host_identity_phrases() {
        for text in [
            "Host key verification failed.",
            "ssh: handshake failed: knownhosts: key mismatch",
            "@ WARNING: REMOTE HOST IDENTIFICATION HAS CHANGED! @",
        ] {
            let c = classify_detailed(&msg(text));
            assert_eq!(c.family, Some(Family::HostIdentity), "{text}");
            assert_eq!(both(&msg(text)), (false, true), "{text}");
        }
    }

    #[test]
    fn test_permanent_phrase_beats_transient_phrase() {
        let err = msg("Load key \"/k\": invalid format; unexpected EOF");
        assert_eq!(both(&err), (false, true));
    }

    #[test]
    fn test_phrase_in_source_chain() {
        let err = wrap("connecting to web1", msg("Host key verification failed."));
        assert_eq!(classify(&err), Verdict::NonRetryable);
    }

    #[test]
    fn test_unrecognized_is_neither() {
        let err = msg("something odd happened");
        assert_eq!(both(&err), (false, false));
        assert_eq!(classify(&err), Verdict::Unknown);
        assert!(!should_retry(&err));
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        assert_eq!(classify(&msg("HOST KEY VERIFICATION FAILED")), Verdict::Unknown);
    }

    #[test]
    fn test_never_both() {
        for text in [
            "connection refused: permission denied",
            "EOF: no such host",
            "broken pipe, key mismatch",
        ] {
            let (retry, permanent) = both(&msg(text));
            assert!(!(retry && permanent), "{text}");
        }
    }

    #[test]
    fn test_family_advice() {
        assert_eq!(Family::Network.verdict(), Verdict::Retryable);
        assert_eq!(Family::Authentication.verdict(), Verdict::NonRetryable);
        assert!(!Family::Resolution.advice().is_empty());
    }

    #[test]
    fn test_classify_message() {
        assert_eq!(
            classify_message("ssh: connect to host x port 22: Connection refused").verdict,
            Verdict::Retryable
        );
        assert_eq!(classify_message("all good").verdict, Verdict::Unknown);
    }
}
