//! Service checks through systemd

use super::quote;
use crate::spec::{ServiceSpec, VerifySpec};
use anyhow::Result;
use checkrun::{CancelToken, CheckHandler, CheckResult, Provider, Recorder};
use std::ops::ControlFlow;

pub(crate) const HAS_SYSTEMCTL: &str = "command -v systemctl >/dev/null 2>&1";

pub(crate) fn active_command(name: &str) -> String {
    format!("systemctl is-active {}", quote(name))
}

pub(crate) fn enabled_command(name: &str) -> String {
    format!("systemctl is-enabled {}", quote(name))
}

pub struct Services;

impl Services {
    fn check(
        service: &ServiceSpec,
        cancel: &CancelToken,
        provider: &dyn Provider,
    ) -> Result<CheckResult> {
        let name = format!("service {}", service.name);
        if !provider.run_status(cancel, HAS_SYSTEMCTL)? {
            return Ok(CheckResult::skipped(name, "systemctl not available"));
        }

        let mut problems = Vec::new();

        // is-active prints the state even when it exits non-zero
        let active = provider.execute_command(cancel, &active_command(&service.name))?;
        let state = active.stdout_trimmed().to_string();
        let running = state == "active";
        if running != service.running {
            let expected = if service.running { "active" } else { "not active" };
            problems.push(format!("{}, expected {}", display_state(&state), expected));
        }

        let mut result_details = vec![("state", state)];

        if let Some(want_enabled) = service.enabled {
            let enabled = provider.execute_command(cancel, &enabled_command(&service.name))?;
            let enablement = enabled.stdout_trimmed().to_string();
            let is_enabled = enablement == "enabled";
            if is_enabled != want_enabled {
                let expected = if want_enabled { "enabled" } else { "disabled" };
                problems.push(format!("{}, expected {}", display_state(&enablement), expected));
            }
            result_details.push(("enabled", enablement));
        }

        let mut result = if problems.is_empty() {
            let message = if service.running { "running" } else { "not running" };
            CheckResult::passed(name, message)
        } else {
            CheckResult::failed(name, problems.join("; "))
        };
        for (key, value) in result_details {
            result = result.with_detail(key, value);
        }
        Ok(result)
    }
}

fn display_state(state: &str) -> &str {
    if state.is_empty() { "unknown" } else { state }
}

impl CheckHandler<VerifySpec> for Services {
    fn domain(&self) -> &'static str {
        "services"
    }

    fn is_empty(&self, spec: &VerifySpec) -> bool {
        spec.services.is_empty()
    }

    fn run(
        &self,
        cancel: &CancelToken,
        spec: &VerifySpec,
        provider: &dyn Provider,
        recorder: &mut Recorder<'_>,
    ) -> ControlFlow<()> {
        for service in &spec.services {
            recorder.check(format!("service {}", service.name), || {
                Self::check(service, cancel, provider)
            })?;
        }
        ControlFlow::Continue(())
    }
}
