use super::{Output, Session, run_child};
use crate::error::Result;
use std::process::Command;

/// Runs commands on this machine with `sh -c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalShell;

impl Session for LocalShell {
    fn name(&self) -> String {
        crate::target::LOCAL.to_string()
    }

    fn run_until(&self, command: &str, interrupted: &dyn Fn() -> bool) -> Result<Output> {
        log::trace!("local: {}", command);
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        run_child(cmd, "sh", interrupted)
    }
}
