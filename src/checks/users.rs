//! User account checks via `getent passwd`

use super::quote;
use crate::spec::{Presence, UserSpec, VerifySpec};
use anyhow::{Result, bail};
use checkrun::{CancelToken, CheckHandler, CheckResult, Provider, Recorder};
use std::ops::ControlFlow;

/// `getent` exit code for "key not found"
pub(crate) const GETENT_NOT_FOUND: i32 = 2;

pub(crate) fn passwd_command(name: &str) -> String {
    format!("getent passwd {}", quote(name))
}

pub(crate) fn groups_command(name: &str) -> String {
    format!("id -Gn {}", quote(name))
}

/// One `passwd` entry
#[derive(Debug, PartialEq, Eq)]
struct Account {
    uid: u32,
    home: String,
    shell: String,
}

fn parse_passwd(line: &str) -> Result<Account> {
    let fields: Vec<&str> = line.trim().split(':').collect();
    if fields.len() < 7 {
        bail!("unexpected passwd entry: {}", line.trim());
    }
    let uid = fields[2]
        .parse()
        .map_err(|_| anyhow::anyhow!("unexpected uid '{}'", fields[2]))?;
    Ok(Account {
        uid,
        home: fields[5].to_string(),
        shell: fields[6].to_string(),
    })
}

pub struct Users;

impl Users {
    fn check(
        user: &UserSpec,
        cancel: &CancelToken,
        provider: &dyn Provider,
    ) -> Result<CheckResult> {
        let name = format!("user {}", user.name);
        let out = provider.execute_command(cancel, &passwd_command(&user.name))?;

        let exists = match out.exit_code {
            0 => true,
            GETENT_NOT_FOUND => false,
            code => bail!("getent exited with {}: {}", code, out.stderr.trim()),
        };

        if user.state == Presence::Absent {
            return Ok(CheckResult::from_bool(name, !exists, "absent", "exists, expected absent"));
        }
        if !exists {
            return Ok(CheckResult::failed(name, "does not exist"));
        }

        let account = parse_passwd(out.stdout_trimmed())?;
        let mut problems = Vec::new();

        if let Some(uid) = user.uid
            && account.uid != uid
        {
            problems.push(format!("uid {}, expected {}", account.uid, uid));
        }
        if let Some(home) = &user.home
            && &account.home != home
        {
            problems.push(format!("home {}, expected {}", account.home, home));
        }
        if let Some(shell) = &user.shell
            && &account.shell != shell
        {
            problems.push(format!("shell {}, expected {}", account.shell, shell));
        }

        if !user.groups.is_empty() {
            let member_of = provider.run_capture(cancel, &groups_command(&user.name))?;
            let member_of: Vec<&str> = member_of.split_whitespace().collect();
            let missing: Vec<&str> = user
                .groups
                .iter()
                .map(String::as_str)
                .filter(|g| !member_of.contains(g))
                .collect();
            if !missing.is_empty() {
                problems.push(format!("not in groups: {}", missing.join(", ")));
            }
        }

        let result = if problems.is_empty() {
            CheckResult::passed(name, "present")
        } else {
            CheckResult::failed(name, problems.join("; "))
        };
        Ok(result
            .with_detail("uid", account.uid)
            .with_detail("home", account.home)
            .with_detail("shell", account.shell))
    }
}

impl CheckHandler<VerifySpec> for Users {
    fn domain(&self) -> &'static str {
        "users"
    }

    fn is_empty(&self, spec: &VerifySpec) -> bool {
        spec.users.is_empty()
    }

    fn run(
        &self,
        cancel: &CancelToken,
        spec: &VerifySpec,
        provider: &dyn Provider,
        recorder: &mut Recorder<'_>,
    ) -> ControlFlow<()> {
        for user in &spec.users {
            recorder.check(format!("user {}", user.name), || Self::check(user, cancel, provider))?;
        }
        ControlFlow::Continue(())
    }
}
