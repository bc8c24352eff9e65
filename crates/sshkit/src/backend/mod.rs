//! Command execution backends.
//!
//! A [`Session`] runs shell command strings on one machine and reports
//! what came back. Backends only fail for transport problems; a command
//! exiting non-zero is a normal [`Output`].

mod local;
mod ssh;

pub use local::LocalShell;
pub use ssh::{HostKeyPolicy, SshOptions, SshSession};

use crate::error::{Error, Result};
use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

const POLL_MIN: Duration = Duration::from_millis(2);
const POLL_MAX: Duration = Duration::from_millis(50);

/// Captured result of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `-1` when the process was killed by a signal
    pub exit_code: i32,
}

impl Output {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    fn from_parts(status: ExitStatus, stdout: &[u8], stderr: &[u8]) -> Self {
        Self {
            stdout: String::from_utf8_lossy(stdout).into_owned(),
            stderr: String::from_utf8_lossy(stderr).into_owned(),
            exit_code: status.code().unwrap_or(-1),
        }
    }
}

/// Something that can run commands on a machine.
pub trait Session: Send {
    /// Human-readable name of the machine
    fn name(&self) -> String;

    /// Run a command through the machine's shell
    fn run(&self, command: &str) -> Result<Output> {
        self.run_until(command, &|| false)
    }

    /// Run a command, killing it as soon as `interrupted` returns true
    ///
    /// `interrupted` is polled while the command runs. A killed command
    /// yields [`Error::Interrupted`].
    fn run_until(&self, command: &str, interrupted: &dyn Fn() -> bool) -> Result<Output>;
}

impl<S: Session + ?Sized> Session for Box<S> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn run_until(&self, command: &str, interrupted: &dyn Fn() -> bool) -> Result<Output> {
        (**self).run_until(command, interrupted)
    }
}

fn drain(pipe: Option<impl Read>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    buf
}

/// Signal the child's whole process group so shell children die with it.
#[cfg(unix)]
#[allow(unsafe_code)]
fn kill(child: &mut Child) {
    let pgid = child.id() as libc::pid_t;
    // SAFETY: kill(2) only sends a signal; no memory is shared with the callee.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill(child: &mut Child) {
    let _ = child.kill();
}

/// Wait for the child, or kill it once `interrupted` fires. `None` means killed.
fn wait_or_kill(child: &mut Child, interrupted: &dyn Fn() -> bool) -> io::Result<Option<ExitStatus>> {
    let mut pause = POLL_MIN;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if interrupted() {
            kill(child);
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(pause);
        pause = (pause * 2).min(POLL_MAX);
    }
}

/// Spawn `cmd` with captured output and wait for it, interruptibly.
pub(crate) fn run_child(
    mut cmd: Command,
    program: &str,
    interrupted: &dyn Fn() -> bool,
) -> Result<Output> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    std::os::unix::process::CommandExt::process_group(&mut cmd, 0);

    let spawn_error = |source| Error::Spawn {
        program: program.to_string(),
        source,
    };
    let mut child = cmd.spawn().map_err(spawn_error)?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // Pipes are drained on their own threads so a chatty command never
    // blocks on a full pipe while we poll.
    let (status, stdout, stderr) = thread::scope(|scope| {
        let out = scope.spawn(move || drain(stdout));
        let err = scope.spawn(move || drain(stderr));
        let status = wait_or_kill(&mut child, interrupted);
        (
            status,
            out.join().unwrap_or_default(),
            err.join().unwrap_or_default(),
        )
    });

    match status.map_err(spawn_error)? {
        Some(status) => Ok(Output::from_parts(status, &stdout, &stderr)),
        None => {
            log::debug!("{}: killed after interruption", program);
            Err(Error::Interrupted {
                program: program.to_string(),
            })
        }
    }
}
