//! Arbitrary command checks - exit code and output assertions

use crate::spec::{CommandSpec, VerifySpec};
use anyhow::{Context, Result};
use checkrun::{CancelToken, CheckHandler, CheckResult, Provider, Recorder};
use regex::Regex;
use std::ops::ControlFlow;

pub struct Commands;

impl Commands {
    fn check(
        cmd: &CommandSpec,
        cancel: &CancelToken,
        provider: &dyn Provider,
    ) -> Result<CheckResult> {
        let name = format!("command {}", cmd.display_name());
        let out = provider.execute_command(cancel, &cmd.command)?;
        let mut problems = Vec::new();

        if out.exit_code != cmd.exit_code {
            problems.push(format!("exit code {}, expected {}", out.exit_code, cmd.exit_code));
        }
        if let Some(needle) = &cmd.stdout_contains
            && !out.stdout.contains(needle.as_str())
        {
            problems.push(format!("stdout missing '{}'", needle));
        }
        if let Some(needle) = &cmd.stderr_contains
            && !out.stderr.contains(needle.as_str())
        {
            problems.push(format!("stderr missing '{}'", needle));
        }
        if let Some(pattern) = &cmd.stdout_matches {
            let re = Regex::new(pattern).with_context(|| format!("invalid pattern '{}'", pattern))?;
            if !re.is_match(&out.stdout) {
                problems.push(format!("stdout does not match /{}/", pattern));
            }
        }

        let result = if problems.is_empty() {
            CheckResult::passed(name, format!("exit {}", out.exit_code))
        } else {
            CheckResult::failed(name, problems.join("; "))
        };
        Ok(result
            .with_detail("exit_code", out.exit_code)
            .with_detail("stdout", out.stdout_trimmed()))
    }
}

impl CheckHandler<VerifySpec> for Commands {
    fn domain(&self) -> &'static str {
        "commands"
    }

    fn is_empty(&self, spec: &VerifySpec) -> bool {
        spec.commands.is_empty()
    }

    fn run(
        &self,
        cancel: &CancelToken,
        spec: &VerifySpec,
        provider: &dyn Provider,
        recorder: &mut Recorder<'_>,
    ) -> ControlFlow<()> {
        for cmd in &spec.commands {
            recorder.check(format!("command {}", cmd.display_name()), || {
                Self::check(cmd, cancel, provider)
            })?;
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testing::{ScriptedProvider, run};
    use crate::remote::SessionProvider;
    use checkrun::{Dispatcher, Status};

    fn command(command: &str) -> CommandSpec {
        CommandSpec {
            name: None,
            command: command.to_string(),
            exit_code: 0,
            stdout_contains: None,
            stderr_contains: None,
            stdout_matches: None,
        }
    }

    fn spec(commands: Vec<CommandSpec>) -> VerifySpec {
        VerifySpec {
            name: "cmds".to_string(),
            commands,
            ..Default::default()
        }
    }

    #[test]
    fn test_exit_code_and_output() {
        let provider = ScriptedProvider::new()
            .on("uname -s", "Linux\n", 0)
            .on("nginx -t", "", 1);
        let mut uname = command("uname -s");
        uname.name = Some("kernel".to_string());
        uname.stdout_matches = Some("^Linux".to_string());
        let mut nginx = command("nginx -t");
        nginx.stdout_contains = Some("ok".to_string());

        let results = run(Commands, &spec(vec![uname, nginx]), &provider);

        assert_eq!(results[0].name, "command kernel");
        assert_eq!(results[0].status, Status::Passed);
        assert_eq!(results[0].details["stdout"], "Linux");
        assert_eq!(results[1].status, Status::Failed);
        assert_eq!(results[1].message, "exit code 1, expected 0; stdout missing 'ok'");
    }

    #[test]
    fn test_expected_non_zero_exit() {
        let provider = ScriptedProvider::new().on("test -e /nope", "", 1);
        let mut absent = command("test -e /nope");
        absent.exit_code = 1;
        let results = run(Commands, &spec(vec![absent]), &provider);
        assert_eq!(results[0].status, Status::Passed);
    }

    #[test]
    fn test_provider_error_is_errored() {
        let results = run(Commands, &spec(vec![command("unscripted")]), &ScriptedProvider::new());
        assert_eq!(results[0].status, Status::Errored);
        assert!(results[0].message.contains("unexpected command"));
    }

    #[test]
    fn test_fail_fast_stops_at_first_failure() {
        let mut spec = spec(vec![command("true"), command("false"), command("true")]);
        spec.config.fail_fast = true;

        let batch = Dispatcher::new()
            .register(Commands)
            .execute("local", &spec, &SessionProvider::new(sshkit::LocalShell));

        let statuses: Vec<Status> = batch.results.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![Status::Passed, Status::Failed]);
    }

    #[test]
    fn test_stderr_assertion_locally() {
        let mut cmd = command("echo boom >&2");
        cmd.stderr_contains = Some("boom".to_string());
        let batch = Dispatcher::new()
            .register(Commands)
            .execute("local", &spec(vec![cmd]), &SessionProvider::new(sshkit::LocalShell));
        assert_eq!(batch.results[0].status, Status::Passed);
    }
}
