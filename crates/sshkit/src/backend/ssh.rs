use super::{Output, Session, run_child};
use crate::error::{Error, Result};
use crate::target::SshTarget;
use serde::Deserialize;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

/// Exit status the OpenSSH client uses for its own failures.
const SSH_CLIENT_FAILURE: i32 = 255;

const DEFAULT_PORT: u16 = 22;

/// `StrictHostKeyChecking` mode passed to the ssh client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Refuse unknown and changed keys
    Yes,
    /// Record unknown keys, refuse changed ones
    #[default]
    AcceptNew,
    /// Accept anything
    No,
}

impl HostKeyPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::AcceptNew => "accept-new",
            Self::No => "no",
        }
    }
}

/// How to reach hosts over ssh.
#[derive(Debug, Clone)]
pub struct SshOptions {
    /// Client binary
    pub program: String,
    /// Login user when the target does not name one
    pub user: Option<String>,
    /// Port when the target does not name one
    pub port: Option<u16>,
    pub identity_file: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub host_key_policy: HostKeyPolicy,
    /// Extra `-o` options, e.g. `ServerAliveInterval=15`
    pub extra_options: Vec<String>,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            user: None,
            port: None,
            identity_file: None,
            connect_timeout: Duration::from_secs(10),
            host_key_policy: HostKeyPolicy::default(),
            extra_options: Vec::new(),
        }
    }
}

impl SshOptions {
    fn port_for(&self, target: &SshTarget) -> u16 {
        target.port.or(self.port).unwrap_or(DEFAULT_PORT)
    }

    /// Client arguments up to and including the destination.
    pub fn args_for(&self, target: &SshTarget) -> Vec<String> {
        let timeout = self.connect_timeout.as_secs().max(1);
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", timeout),
            "-o".to_string(),
            format!("StrictHostKeyChecking={}", self.host_key_policy.as_str()),
            "-p".to_string(),
            self.port_for(target).to_string(),
        ];

        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
            args.push("-o".to_string());
            args.push("IdentitiesOnly=yes".to_string());
        }
        for option in &self.extra_options {
            args.push("-o".to_string());
            args.push(option.clone());
        }

        let user = target.user.as_ref().or(self.user.as_ref());
        match user {
            Some(user) => args.push(format!("{}@{}", user, target.host)),
            None => args.push(target.host.clone()),
        }
        args
    }
}

/// Resolve a host, trying every address with a TCP connect.
///
/// Surfaces refusals and timeouts as real socket errors before the ssh
/// client gets involved.
fn tcp_reachable(host: &str, port: u16, timeout: Duration) -> Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| Error::Resolve {
            host: host.to_string(),
            source,
        })?
        .collect();

    let mut last = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => return Ok(addr),
            Err(source) => {
                log::debug!("{}: connect to {} failed: {}", host, addr, source);
                last = Some(Error::Connect {
                    addr: addr.to_string(),
                    source,
                });
            }
        }
    }

    Err(last.unwrap_or_else(|| Error::NoAddress {
        host: host.to_string(),
    }))
}

/// Connection to one host through the system ssh client.
///
/// Every command is a separate client invocation. Exit status 255 is
/// reported as a transport error; a remote command that itself exits 255
/// is indistinguishable from that.
#[derive(Debug, Clone)]
pub struct SshSession {
    target: SshTarget,
    args: Vec<String>,
    program: String,
}

impl SshSession {
    /// Check the host is reachable (TCP, then `ssh ... true`) and return a session.
    pub fn connect(target: &SshTarget, options: &SshOptions) -> Result<Self> {
        let port = options.port_for(target);
        let addr = tcp_reachable(&target.host, port, options.connect_timeout)?;
        log::debug!("{}: reachable at {}", target, addr);

        let session = Self {
            target: target.clone(),
            args: options.args_for(target),
            program: options.program.clone(),
        };
        session.run("true")?;
        Ok(session)
    }

    pub fn target(&self) -> &SshTarget {
        &self.target
    }

    fn command(&self, remote: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg("--").arg(remote);
        cmd
    }
}

impl Session for SshSession {
    fn name(&self) -> String {
        self.target.to_string()
    }

    fn run_until(&self, command: &str, interrupted: &dyn Fn() -> bool) -> Result<Output> {
        log::trace!("{}: {}", self.target, command);
        let output = run_child(self.command(command), &self.program, interrupted)?;

        if output.exit_code == SSH_CLIENT_FAILURE {
            return Err(Error::Ssh {
                host: self.target.destination(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}
