use anyhow::{Context as _, Result, bail};
use checkrun::{FleetOutcome, Job, NoFleetProgress, ParallelExecutor};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::Context;
use crate::cli::RunArgs;
use crate::config::{Inventory, PlannedHost, VigilConfig};
use crate::job::{HostPlan, HostRunner};
use crate::report::{self, Format};
use crate::spec::{self, VerifySpec};
use crate::ui;

/// Loads each spec file once, however many hosts use it
#[derive(Default)]
struct SpecCache {
    loaded: HashMap<PathBuf, Arc<VerifySpec>>,
}

impl SpecCache {
    fn get(&mut self, path: &Path) -> Result<Arc<VerifySpec>> {
        if let Some(spec) = self.loaded.get(path) {
            return Ok(Arc::clone(spec));
        }
        let spec = Arc::new(VerifySpec::load(path)?);
        log::debug!("Loaded spec '{}' from {}", spec.name, path.display());
        self.loaded.insert(path.to_path_buf(), Arc::clone(&spec));
        Ok(spec)
    }

    fn get_all(&mut self, args: &[PathBuf]) -> Result<Vec<Arc<VerifySpec>>> {
        spec::collect_paths(args)?
            .iter()
            .map(|path| self.get(path))
            .collect()
    }
}

/// Hosts from `--hosts` and `--inventory`; `local` when neither names any
fn planned_hosts(args: &RunArgs) -> Result<Vec<PlannedHost>> {
    let mut planned: Vec<PlannedHost> = args
        .hosts
        .iter()
        .map(|h| h.trim())
        .filter(|h| !h.is_empty())
        .map(|h| PlannedHost {
            target: h.to_string(),
            specs: None,
        })
        .collect();

    if let Some(path) = &args.inventory {
        let inventory = Inventory::load(path)?;
        let base = path.parent().unwrap_or(Path::new("."));
        planned.extend(inventory.planned(base));
    }

    if planned.is_empty() {
        planned.push(PlannedHost {
            target: sshkit::target::LOCAL.to_string(),
            specs: None,
        });
    }

    let mut seen = HashSet::new();
    planned.retain(|host| {
        let first = seen.insert(host.target.clone());
        if !first {
            log::warn!("Ignoring duplicate host '{}'", host.target);
        }
        first
    });
    Ok(planned)
}

fn build_jobs(args: &RunArgs, planned: Vec<PlannedHost>) -> Result<Vec<Job<HostPlan>>> {
    let mut cache = SpecCache::default();
    let default_specs = cache.get_all(&args.specs)?;

    planned
        .into_iter()
        .map(|host| {
            let specs = match &host.specs {
                Some(paths) => cache.get_all(paths)?,
                None => default_specs.clone(),
            };
            if specs.is_empty() {
                bail!("No spec files for host '{}'", host.target);
            }
            let target = host
                .target
                .parse()
                .with_context(|| format!("Invalid host '{}'", host.target))?;
            Ok(Job::new(host.target, HostPlan { target, specs }))
        })
        .collect()
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(4)
}

pub fn run(ctx: &Context, args: RunArgs) -> Result<()> {
    let mut config = VigilConfig::load()?;
    if let Some(retries) = args.retries {
        config.connect.retries = retries;
    }

    let jobs = build_jobs(&args, planned_hosts(&args)?)?;
    let submitted = jobs.len();
    let workers = args.jobs.or(config.run.jobs).unwrap_or_else(default_jobs);
    let fail_fast = args.fail_fast || config.run.fail_fast;
    let timeout = args.timeout.or(config.run.timeout_secs);

    log::info!(
        "Checking {} hosts with {} workers (fail-fast: {})",
        submitted,
        workers,
        fail_fast
    );

    // Live per-check lines only make sense when output can't interleave
    let stream = ctx.verbose > 0 && submitted == 1 && args.format == Format::Text;
    let runner = HostRunner::new(config.ssh_options(), config.connect.retry_config())
        .with_streaming(stream);

    let mut executor = ParallelExecutor::new(workers, fail_fast, ctx.verbose > 0);
    if let Some(secs) = timeout {
        executor = executor.with_timeout(Duration::from_secs(secs));
    }
    if ctx.quiet {
        executor = executor.with_progress(Box::new(NoFleetProgress));
    }

    let mut fleet = executor.execute(jobs, |cancel, job| runner.run(cancel, job))?;
    if args.sort {
        fleet.sort_by_target();
    }

    match args.format {
        Format::Json => println!("{}", report::json(&fleet)?),
        Format::Text => print!("{}", report::text(&fleet, submitted, ctx.verbose > 0)),
    }

    finish(&fleet, submitted)
}

fn finish(fleet: &FleetOutcome, submitted: usize) -> Result<()> {
    if fleet.success() {
        return Ok(());
    }
    let summary = fleet.summary();
    if summary.failed_hosts == 0 {
        ui::error("Run stopped before every host was checked");
        bail!("{} of {} hosts not checked", submitted - summary.total_hosts, submitted);
    }
    bail!("{} of {} hosts failed", summary.failed_hosts, submitted)
}
