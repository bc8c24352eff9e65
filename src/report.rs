//! Rendering run outcomes as text or JSON

use crate::ui;
use anyhow::{Context, Result};
use checkrun::{CheckResult, FleetOutcome, HostOutcome, Status, TargetBatch};
use colored::Colorize;
use std::fmt::Write;

/// Output format for `vigil run`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    #[default]
    Text,
    Json,
}

/// Print one result as soon as it is known
pub fn print_live(target: &str, result: &CheckResult) {
    println!(
        "  {} {} {} {}",
        ui::status_symbol(result.status),
        format!("[{}]", target).dimmed(),
        result.name,
        format!("- {}", result.message).dimmed()
    );
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{} {}", n, word)
    } else {
        format!("{} {}s", n, word)
    }
}

fn write_result(out: &mut String, result: &CheckResult) {
    let _ = writeln!(
        out,
        "      {} {} - {}",
        ui::status_symbol(result.status),
        result.name,
        result.message
    );
}

fn write_batch(out: &mut String, batch: &TargetBatch, detailed: bool) {
    let s = batch.summary();
    let mut line = format!("{}: {} passed", batch.spec_name, s.passed);
    if s.failed > 0 {
        line.push_str(&format!(", {} failed", s.failed));
    }
    if s.errored > 0 {
        line.push_str(&format!(", {} errored", s.errored));
    }
    if s.skipped > 0 {
        line.push_str(&format!(", {} skipped", s.skipped));
    }
    if batch.interrupted {
        line.push_str(" (interrupted)");
    }
    let _ = writeln!(out, "    {}", line);

    for result in &batch.results {
        if detailed || result.status != Status::Passed {
            write_result(out, result);
        }
    }
}

fn write_host(out: &mut String, host: &HostOutcome, detailed: bool) {
    let symbol = ui::host_symbol(host.success());
    if !host.connected {
        let error = host.connection_error.as_deref().unwrap_or("unknown error");
        let _ = writeln!(
            out,
            "{} {}  {}",
            symbol,
            host.target.bold(),
            format!("connection failed: {}", error).red()
        );
        return;
    }

    let checks: usize = host.batches.iter().map(|b| b.results.len()).sum();
    let _ = writeln!(
        out,
        "{} {}  {}",
        symbol,
        host.target.bold(),
        format!(
            "({}, {}, {})",
            plural(host.batches.len(), "spec"),
            plural(checks, "check"),
            ui::format_secs(host.duration)
        )
        .dimmed()
    );

    if detailed || !host.success() {
        for batch in &host.batches {
            write_batch(out, batch, detailed);
        }
    }
}

/// Human-readable report
///
/// `submitted` is the number of hosts the run was asked to check; hosts
/// missing from `fleet` were never attempted.
pub fn text(fleet: &FleetOutcome, submitted: usize, detailed: bool) -> String {
    let mut out = String::new();
    let title = "Verification results";
    let _ = writeln!(out, "{}", title.bold());
    let _ = writeln!(out, "{}", "─".repeat(title.len()).dimmed());

    for host in &fleet.hosts {
        write_host(&mut out, host, detailed);
    }

    let hosts = fleet.summary();
    let checks = fleet.check_summary();
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "  {}: {} ({} passed, {} failed, {} connection errors)",
        "hosts".dimmed(),
        hosts.total_hosts,
        hosts.passed_hosts,
        hosts.failed_hosts,
        hosts.connection_errors
    );
    let _ = writeln!(
        out,
        "  {}: {} ({} passed, {} failed, {} errored, {} skipped)",
        "checks".dimmed(),
        checks.total,
        checks.passed,
        checks.failed,
        checks.errored,
        checks.skipped
    );
    let _ = writeln!(out, "  {}: {}", "duration".dimmed(), ui::format_secs(fleet.duration));

    if fleet.cancelled {
        let skipped = submitted.saturating_sub(fleet.hosts.len());
        let _ = writeln!(
            out,
            "{} run stopped early: {} of {} not attempted",
            "⚠".yellow(),
            skipped,
            plural(submitted, "host")
        );
    }
    out
}

/// Pretty-printed JSON of the whole outcome
pub fn json(fleet: &FleetOutcome) -> Result<String> {
    serde_json::to_string_pretty(fleet).context("Failed to serialize results")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fleet() -> FleetOutcome {
        let mut ok = TargetBatch::new("web1", "base");
        ok.results = vec![CheckResult::passed("package curl", "installed (8.5)")];
        let mut bad = TargetBatch::new("web2", "base");
        bad.results = vec![
            CheckResult::passed("package curl", "installed (8.5)"),
            CheckResult::failed("service nginx", "inactive, expected active"),
        ];

        FleetOutcome {
            hosts: vec![
                HostOutcome::connected("web1", vec![ok], Duration::from_millis(300)),
                HostOutcome::connected("web2", vec![bad], Duration::from_millis(400)),
                HostOutcome::connection_failed("db1", "Connection refused", Duration::ZERO)
                    .with_attempts(3),
            ],
            duration: Duration::from_millis(900),
            cancelled: false,
        }
    }

    #[test]
    fn test_text_report() {
        colored::control::set_override(false);
        let report = text(&fleet(), 3, false);

        assert!(report.contains("✓ web1  (1 spec, 1 check, 300ms)"), "{report}");
        assert!(report.contains("    base: 1 passed, 1 failed"), "{report}");
        assert!(report.contains("      ✗ service nginx - inactive, expected active"));
        // passing checks are only listed in detailed mode
        assert!(!report.contains("✓ package curl"));
        assert!(report.contains("✗ db1  connection failed: Connection refused"));
        assert!(report.contains("hosts: 3 (1 passed, 2 failed, 1 connection errors)"));
        assert!(report.contains("checks: 3 (2 passed, 1 failed, 0 errored, 0 skipped)"));
        assert!(!report.contains("stopped early"));
    }

    #[test]
    fn test_detailed_text_lists_everything() {
        colored::control::set_override(false);
        let report = text(&fleet(), 3, true);
        assert!(report.contains("      ✓ package curl - installed (8.5)"));
    }

    #[test]
    fn test_cancelled_run_notes_skipped_hosts() {
        colored::control::set_override(false);
        let mut fleet = fleet();
        fleet.cancelled = true;
        let report = text(&fleet, 10, false);
        assert!(report.contains("run stopped early: 7 of 10 hosts not attempted"));
    }

    #[test]
    fn test_json_report() {
        let value: serde_json::Value = serde_json::from_str(&json(&fleet()).unwrap()).unwrap();
        assert_eq!(value["hosts"][0]["target"], "web1");
        assert_eq!(value["hosts"][1]["batches"][0]["results"][1]["status"], "failed");
        assert_eq!(value["hosts"][2]["connected"], false);
        assert_eq!(value["hosts"][2]["attempts"], 3);
        assert_eq!(value["cancelled"], false);
    }
}
