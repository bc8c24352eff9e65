//! Target addresses: `local` or `[user@]host[:port]`.

use crate::error::Error;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Name that selects the local shell instead of ssh.
pub const LOCAL: &str = "local";

/// Where commands run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Target {
    /// This machine, through `sh -c`
    Local,
    /// A remote machine, through the `ssh` client
    Ssh(SshTarget),
}

/// Remote host reached over ssh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SshTarget {
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
}

impl SshTarget {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            user: None,
            host: host.into(),
            port: None,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// `user@host` or `host`, as passed to the ssh client.
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }
}

impl fmt::Display for SshTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        let bracket = self.host.contains(':');
        match (self.port, bracket) {
            (Some(port), true) => write!(f, "[{}]:{}", self.host, port),
            (Some(port), false) => write!(f, "{}:{}", self.host, port),
            (None, _) => f.write_str(&self.host),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str(LOCAL),
            Self::Ssh(ssh) => ssh.fmt(f),
        }
    }
}

fn invalid(target: &str, reason: &str) -> Error {
    Error::InvalidTarget {
        target: target.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_port(target: &str, port: &str) -> Result<u16, Error> {
    match port.parse::<u16>() {
        Ok(0) => Err(invalid(target, "port must be between 1 and 65535")),
        Ok(port) => Ok(port),
        Err(_) => Err(invalid(target, &format!("invalid port '{}'", port))),
    }
}

impl FromStr for SshTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(invalid(s, "empty target"));
        }

        let (user, rest) = match trimmed.rsplit_once('@') {
            Some(("", _)) => return Err(invalid(s, "empty user")),
            Some((user, rest)) => (Some(user.to_string()), rest),
            None => (None, trimmed),
        };

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, after) = bracketed
                .split_once(']')
                .ok_or_else(|| invalid(s, "missing ']'"))?;
            let port = match after {
                "" => None,
                _ => {
                    let port = after
                        .strip_prefix(':')
                        .ok_or_else(|| invalid(s, "unexpected text after ']'"))?;
                    Some(parse_port(s, port)?)
                }
            };
            (host, port)
        } else if rest.matches(':').count() > 1 {
            // bare IPv6 address, no port
            (rest, None)
        } else if let Some((host, port)) = rest.split_once(':') {
            (host, Some(parse_port(s, port)?))
        } else {
            (rest, None)
        };

        if host.is_empty() {
            return Err(invalid(s, "empty host"));
        }

        Ok(Self {
            user,
            host: host.to_string(),
            port,
        })
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == LOCAL {
            return Ok(Self::Local);
        }
        s.parse().map(Self::Ssh)
    }
}
