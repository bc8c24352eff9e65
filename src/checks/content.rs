//! File content checks - substrings and regular expressions

use super::quote;
use crate::spec::{ContentSpec, VerifySpec};
use anyhow::{Context, Result, bail};
use checkrun::{CancelToken, CheckHandler, CheckResult, Provider, Recorder};
use regex::Regex;
use std::ops::ControlFlow;

/// Exit code when the file does not exist
const MISSING: i32 = 3;

pub(crate) fn read_command(path: &str) -> String {
    let path = quote(path);
    format!("[ -e {path} ] || exit {MISSING}; cat {path}")
}

pub struct FileContent;

impl FileContent {
    fn check(
        content: &ContentSpec,
        cancel: &CancelToken,
        provider: &dyn Provider,
    ) -> Result<CheckResult> {
        let name = format!("content {}", content.path);
        let out = provider.execute_command(cancel, &read_command(&content.path))?;
        match out.exit_code {
            0 => {}
            MISSING => return Ok(CheckResult::failed(name, "does not exist")),
            code => bail!("could not read {} (exit {}): {}", content.path, code, out.stderr.trim()),
        }

        let text = out.stdout.as_str();
        let mut problems = Vec::new();

        for needle in &content.contains {
            if !text.contains(needle.as_str()) {
                problems.push(format!("missing '{}'", needle));
            }
        }
        for needle in &content.not_contains {
            if text.contains(needle.as_str()) {
                problems.push(format!("contains '{}'", needle));
            }
        }
        for pattern in &content.matches {
            let re = Regex::new(pattern).with_context(|| format!("invalid pattern '{}'", pattern))?;
            if !re.is_match(text) {
                problems.push(format!("no match for /{}/", pattern));
            }
        }

        Ok(if problems.is_empty() {
            CheckResult::passed(name, "content matches")
        } else {
            CheckResult::failed(name, problems.join("; "))
        })
    }
}

impl CheckHandler<VerifySpec> for FileContent {
    fn domain(&self) -> &'static str {
        "file_content"
    }

    fn is_empty(&self, spec: &VerifySpec) -> bool {
        spec.file_content.is_empty()
    }

    fn run(
        &self,
        cancel: &CancelToken,
        spec: &VerifySpec,
        provider: &dyn Provider,
        recorder: &mut Recorder<'_>,
    ) -> ControlFlow<()> {
        for content in &spec.file_content {
            recorder.check(format!("content {}", content.path), || {
                Self::check(content, cancel, provider)
            })?;
        }
        ControlFlow::Continue(())
    }
}
