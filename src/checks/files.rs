//! File checks - existence, type, permissions and ownership

use super::quote;
use crate::spec::{FileKind, FileSpec, Presence, VerifySpec};
use anyhow::{Context, Result, bail};
use checkrun::{CancelToken, CheckHandler, CheckResult, Provider, Recorder};
use std::ops::ControlFlow;

/// Prints `type|mode|owner|group`, exits 1 when the path does not exist.
/// Tries GNU stat first, then BSD stat.
const STAT: &str = r#"p=__PATH__
if [ ! -e "$p" ] && [ ! -L "$p" ]; then exit 1; fi
stat -c '%F|%a|%U|%G' "$p" 2>/dev/null || stat -f '%HT|%Lp|%Su|%Sg' "$p""#;

pub(crate) fn stat_command(path: &str) -> String {
    STAT.replace("__PATH__", &quote(path))
}

/// What stat reported about a path
#[derive(Debug, PartialEq, Eq)]
struct Stat {
    kind: Option<FileKind>,
    mode: u32,
    owner: String,
    group: String,
}

fn parse_stat(line: &str) -> Result<Stat> {
    let fields: Vec<&str> = line.trim().split('|').collect();
    let [kind, mode, owner, group] = fields.as_slice() else {
        bail!("unexpected stat output: {}", line.trim());
    };

    let kind = kind.to_lowercase();
    let kind = if kind.contains("directory") {
        Some(FileKind::Directory)
    } else if kind.contains("symbolic link") {
        Some(FileKind::Symlink)
    } else if kind.contains("regular") {
        Some(FileKind::File)
    } else {
        None
    };

    Ok(Stat {
        kind,
        mode: u32::from_str_radix(mode, 8).with_context(|| format!("unexpected mode '{}'", mode))?,
        owner: (*owner).to_string(),
        group: (*group).to_string(),
    })
}

pub struct Files;

impl Files {
    fn check(
        file: &FileSpec,
        cancel: &CancelToken,
        provider: &dyn Provider,
    ) -> Result<CheckResult> {
        let name = format!("file {}", file.path);
        let out = provider.execute_command(cancel, &stat_command(&file.path))?;

        let exists = match out.exit_code {
            0 => true,
            1 => false,
            code => bail!("stat exited with {}: {}", code, out.stderr.trim()),
        };

        if file.state == Presence::Absent {
            return Ok(CheckResult::from_bool(name, !exists, "absent", "exists, expected absent"));
        }
        if !exists {
            return Ok(CheckResult::failed(name, "does not exist"));
        }

        let stat = parse_stat(out.stdout_trimmed())?;
        let mut problems = Vec::new();

        if let Some(expected) = file.kind
            && stat.kind != Some(expected)
        {
            let actual = stat.kind.map_or("other", FileKind::as_str);
            problems.push(format!("is a {}, expected {}", actual, expected.as_str()));
        }
        if let Some(mode) = &file.mode {
            let expected = u32::from_str_radix(mode, 8)
                .with_context(|| format!("mode '{}' is not octal", mode))?;
            if stat.mode != expected {
                problems.push(format!("mode {:04o}, expected {:04o}", stat.mode, expected));
            }
        }
        if let Some(owner) = &file.owner
            && &stat.owner != owner
        {
            problems.push(format!("owner {}, expected {}", stat.owner, owner));
        }
        if let Some(group) = &file.group
            && &stat.group != group
        {
            problems.push(format!("group {}, expected {}", stat.group, group));
        }

        let result = if problems.is_empty() {
            CheckResult::passed(name, "present")
        } else {
            CheckResult::failed(name, problems.join("; "))
        };
        Ok(result
            .with_detail("mode", format!("{:04o}", stat.mode))
            .with_detail("owner", stat.owner)
            .with_detail("group", stat.group))
    }
}

impl CheckHandler<VerifySpec> for Files {
    fn domain(&self) -> &'static str {
        "files"
    }

    fn is_empty(&self, spec: &VerifySpec) -> bool {
        spec.files.is_empty()
    }

    fn run(
        &self,
        cancel: &CancelToken,
        spec: &VerifySpec,
        provider: &dyn Provider,
        recorder: &mut Recorder<'_>,
    ) -> ControlFlow<()> {
        for file in &spec.files {
            recorder.check(format!("file {}", file.path), || Self::check(file, cancel, provider))?;
        }
        ControlFlow::Continue(())
    }
}
