//! Group checks via `getent group`

use super::quote;
use super::users::GETENT_NOT_FOUND;
use crate::spec::{GroupSpec, Presence, VerifySpec};
use anyhow::{Result, bail};
use checkrun::{CancelToken, CheckHandler, CheckResult, Provider, Recorder};
use std::ops::ControlFlow;

pub(crate) fn group_command(name: &str) -> String {
    format!("getent group {}", quote(name))
}

fn parse_group(line: &str) -> Result<(u32, Vec<String>)> {
    let fields: Vec<&str> = line.trim().split(':').collect();
    if fields.len() < 4 {
        bail!("unexpected group entry: {}", line.trim());
    }
    let gid = fields[2]
        .parse()
        .map_err(|_| anyhow::anyhow!("unexpected gid '{}'", fields[2]))?;
    let members = fields[3]
        .split(',')
        .filter(|m| !m.is_empty())
        .map(String::from)
        .collect();
    Ok((gid, members))
}

pub struct Groups;

impl Groups {
    fn check(
        group: &GroupSpec,
        cancel: &CancelToken,
        provider: &dyn Provider,
    ) -> Result<CheckResult> {
        let name = format!("group {}", group.name);
        let out = provider.execute_command(cancel, &group_command(&group.name))?;

        let exists = match out.exit_code {
            0 => true,
            GETENT_NOT_FOUND => false,
            code => bail!("getent exited with {}: {}", code, out.stderr.trim()),
        };

        if group.state == Presence::Absent {
            return Ok(CheckResult::from_bool(name, !exists, "absent", "exists, expected absent"));
        }
        if !exists {
            return Ok(CheckResult::failed(name, "does not exist"));
        }

        let (gid, members) = parse_group(out.stdout_trimmed())?;
        let mut problems = Vec::new();

        if let Some(expected) = group.gid
            && gid != expected
        {
            problems.push(format!("gid {}, expected {}", gid, expected));
        }
        let missing: Vec<&str> = group
            .members
            .iter()
            .filter(|m| !members.contains(m))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            problems.push(format!("missing members: {}", missing.join(", ")));
        }

        let result = if problems.is_empty() {
            CheckResult::passed(name, "present")
        } else {
            CheckResult::failed(name, problems.join("; "))
        };
        Ok(result.with_detail("gid", gid).with_detail("members", members))
    }
}

impl CheckHandler<VerifySpec> for Groups {
    fn domain(&self) -> &'static str {
        "groups"
    }

    fn is_empty(&self, spec: &VerifySpec) -> bool {
        spec.groups.is_empty()
    }

    fn run(
        &self,
        cancel: &CancelToken,
        spec: &VerifySpec,
        provider: &dyn Provider,
        recorder: &mut Recorder<'_>,
    ) -> ControlFlow<()> {
        for group in &spec.groups {
            recorder.check(format!("group {}", group.name), || {
                Self::check(group, cancel, provider)
            })?;
        }
        ControlFlow::Continue(())
    }
}
