//! Package checks - installed/absent and version prefix

use super::quote;
use crate::spec::{PackageSpec, PackageState, VerifySpec};
use anyhow::{Result, bail};
use checkrun::{CancelToken, CheckHandler, CheckResult, Provider, Recorder};
use std::ops::ControlFlow;

/// Exit code of the query when no known package manager exists
const NO_PACKAGE_MANAGER: i32 = 127;

/// Prints the installed version and exits 0, exits 1 when not installed.
const QUERY: &str = r#"p=__PKG__
if command -v dpkg-query >/dev/null 2>&1; then
  dpkg-query -W -f='${Status}\t${Version}\n' "$p" 2>/dev/null | awk -F'\t' '$1 ~ / installed$/ { print $2; found = 1 } END { exit !found }'
elif command -v rpm >/dev/null 2>&1; then
  rpm -q --qf '%{VERSION}-%{RELEASE}\n' "$p" 2>/dev/null
elif command -v apk >/dev/null 2>&1; then
  apk info -e "$p" >/dev/null 2>&1 && apk list -I "$p" 2>/dev/null | awk '{ print $1 }' | sed "s/^$p-//"
elif command -v pacman >/dev/null 2>&1; then
  pacman -Q "$p" 2>/dev/null | awk '{ print $2 }' | grep .
elif command -v brew >/dev/null 2>&1; then
  brew list --versions "$p" 2>/dev/null | awk '{ print $2 }' | grep .
else
  exit 127
fi"#;

pub(crate) fn query_command(name: &str) -> String {
    QUERY.replace("__PKG__", &quote(name))
}

pub struct Packages;

impl Packages {
    fn check(
        pkg: &PackageSpec,
        cancel: &CancelToken,
        provider: &dyn Provider,
    ) -> Result<CheckResult> {
        let name = format!("package {}", pkg.name);
        let out = provider.execute_command(cancel, &query_command(&pkg.name))?;
        if out.exit_code == NO_PACKAGE_MANAGER {
            bail!("no supported package manager found");
        }

        let installed = out.success();
        let version = out.stdout_trimmed().lines().next().unwrap_or("").to_string();

        let result = match (pkg.state, installed) {
            (PackageState::Installed, false) => CheckResult::failed(name, "not installed"),
            (PackageState::Installed, true) => match &pkg.version {
                Some(expected) if !version.starts_with(expected.as_str()) => CheckResult::failed(
                    name,
                    format!("version {}, expected {}", version, expected),
                ),
                _ => CheckResult::passed(name, format!("installed ({})", version)),
            },
            (PackageState::Absent, true) => {
                CheckResult::failed(name, format!("installed ({}), expected absent", version))
            }
            (PackageState::Absent, false) => CheckResult::passed(name, "not installed"),
        };

        Ok(if version.is_empty() {
            result
        } else {
            result.with_detail("version", version)
        })
    }
}

impl CheckHandler<VerifySpec> for Packages {
    fn domain(&self) -> &'static str {
        "packages"
    }

    fn is_empty(&self, spec: &VerifySpec) -> bool {
        spec.packages.is_empty()
    }

    fn run(
        &self,
        cancel: &CancelToken,
        spec: &VerifySpec,
        provider: &dyn Provider,
        recorder: &mut Recorder<'_>,
    ) -> ControlFlow<()> {
        for pkg in &spec.packages {
            recorder.check(format!("package {}", pkg.name), || Self::check(pkg, cancel, provider))?;
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testing::{ScriptedProvider, run};
    use checkrun::Status;

    fn spec(packages: Vec<PackageSpec>) -> VerifySpec {
        VerifySpec {
            name: "pkgs".to_string(),
            packages,
            ..Default::default()
        }
    }

    fn pkg(name: &str, state: PackageState, version: Option<&str>) -> PackageSpec {
        PackageSpec {
            name: name.to_string(),
            state,
            version: version.map(String::from),
        }
    }

    #[test]
    fn test_installed_with_version_prefix() {
        let provider = ScriptedProvider::new()
            .on(query_command("nginx"), "1.24.0-2ubuntu7\n", 0)
            .on(query_command("curl"), "8.5.0-2\n", 0);
        let results = run(
            Packages,
            &spec(vec![
                pkg("nginx", PackageState::Installed, Some("1.24")),
                pkg("curl", PackageState::Installed, Some("7.")),
            ]),
            &provider,
        );

        assert_eq!(results[0].status, Status::Passed);
        assert_eq!(results[0].name, "package nginx");
        assert_eq!(results[0].details["version"], "1.24.0-2ubuntu7");
        assert_eq!(results[1].status, Status::Failed);
        assert_eq!(results[1].message, "version 8.5.0-2, expected 7.");
    }

    #[test]
    fn test_missing_and_absent() {
        let provider = ScriptedProvider::new()
            .on(query_command("nginx"), "", 1)
            .on(query_command("telnet"), "", 1)
            .on(query_command("ftp"), "0.17\n", 0);
        let results = run(
            Packages,
            &spec(vec![
                pkg("nginx", PackageState::Installed, None),
                pkg("telnet", PackageState::Absent, None),
                pkg("ftp", PackageState::Absent, None),
            ]),
            &provider,
        );

        let statuses: Vec<Status> = results.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![Status::Failed, Status::Passed, Status::Failed]);
        assert_eq!(results[2].message, "installed (0.17), expected absent");
    }

    #[test]
    fn test_no_package_manager_is_errored() {
        let provider = ScriptedProvider::new().on(query_command("nginx"), "", 127);
        let results = run(
            Packages,
            &spec(vec![pkg("nginx", PackageState::Installed, None)]),
            &provider,
        );

        assert_eq!(results[0].status, Status::Errored);
        assert!(results[0].message.contains("package manager"));
    }

    #[test]
    fn test_query_quotes_name() {
        assert!(query_command("lib foo").starts_with("p='lib foo'\n"));
    }
}
