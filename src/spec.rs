//! Spec files - TOML documents declaring the expected state of a machine
//!
//! ```toml
//! name = "web"
//!
//! [config]
//! fail_fast = true
//!
//! [[packages]]
//! name = "nginx"
//!
//! [[services]]
//! name = "nginx"
//! enabled = true
//! ```
//!
//! Domains are checked in a fixed order regardless of their order in the
//! file: packages, files, services, users, groups, file_content, commands.

use anyhow::{Context, Result, bail};
use checkrun::{FailFastPolicy, Spec};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifySpec {
    /// Defaults to the file stem
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: SpecOptions,
    #[serde(default)]
    pub packages: Vec<PackageSpec>,
    #[serde(default)]
    pub files: Vec<FileSpec>,
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
    #[serde(default)]
    pub users: Vec<UserSpec>,
    #[serde(default)]
    pub groups: Vec<GroupSpec>,
    #[serde(default)]
    pub file_content: Vec<ContentSpec>,
    #[serde(default)]
    pub commands: Vec<CommandSpec>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecOptions {
    /// Stop the batch at the first failed check
    #[serde(default)]
    pub fail_fast: bool,
    /// With `fail_fast`, also stop at the first check that could not run
    #[serde(default)]
    pub fail_on_error: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    #[default]
    Present,
    Absent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageState {
    #[default]
    Installed,
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Directory,
    Symlink,
}

impl FileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Symlink => "symlink",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSpec {
    pub name: String,
    #[serde(default)]
    pub state: PackageState,
    /// Installed version must start with this
    pub version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSpec {
    pub path: String,
    #[serde(default)]
    pub state: Presence,
    pub kind: Option<FileKind>,
    /// Octal permission bits, e.g. "0644"
    pub mode: Option<String>,
    pub owner: Option<String>,
    pub group: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSpec {
    pub name: String,
    #[serde(default = "default_true")]
    pub running: bool,
    pub enabled: Option<bool>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserSpec {
    pub name: String,
    #[serde(default)]
    pub state: Presence,
    pub uid: Option<u32>,
    pub home: Option<String>,
    pub shell: Option<String>,
    /// Groups the user must belong to
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupSpec {
    pub name: String,
    #[serde(default)]
    pub state: Presence,
    pub gid: Option<u32>,
    /// Users that must be listed as members
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentSpec {
    pub path: String,
    #[serde(default)]
    pub contains: Vec<String>,
    #[serde(default)]
    pub not_contains: Vec<String>,
    /// Regular expressions that must match somewhere in the file
    #[serde(default)]
    pub matches: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandSpec {
    /// Check name; defaults to the command
    pub name: Option<String>,
    pub command: String,
    #[serde(default)]
    pub exit_code: i32,
    pub stdout_contains: Option<String>,
    pub stderr_contains: Option<String>,
    /// Regular expression stdout must match
    pub stdout_matches: Option<String>,
}

impl CommandSpec {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.command)
    }
}

impl Spec for VerifySpec {
    fn name(&self) -> &str {
        &self.name
    }

    fn fail_fast(&self) -> FailFastPolicy {
        FailFastPolicy::from_flags(self.config.fail_fast, self.config.fail_on_error)
    }
}

impl VerifySpec {
    /// Parse and validate a spec document
    pub fn from_toml(content: &str, fallback_name: &str) -> Result<Self> {
        let mut spec: Self = toml::from_str(content).context("Invalid spec format")?;
        if spec.name.trim().is_empty() {
            spec.name = fallback_name.to_string();
        }

        let problems = spec.problems();
        if !problems.is_empty() {
            bail!("Invalid spec '{}':\n  - {}", spec.name, problems.join("\n  - "));
        }
        Ok(spec)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read spec file: {}", path.display()))?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_toml(&content, &stem).with_context(|| format!("in {}", path.display()))
    }

    /// Total number of declared entries
    pub fn check_count(&self) -> usize {
        self.packages.len()
            + self.files.len()
            + self.services.len()
            + self.users.len()
            + self.groups.len()
            + self.file_content.len()
            + self.commands.len()
    }

    /// Problems that would make checks meaningless, e.g. a bad regex
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for pkg in &self.packages {
            if pkg.name.trim().is_empty() {
                problems.push("package with empty name".to_string());
            }
        }
        for file in &self.files {
            if file.path.trim().is_empty() {
                problems.push("file with empty path".to_string());
            }
            if let Some(mode) = &file.mode
                && u32::from_str_radix(mode, 8).is_err()
            {
                problems.push(format!("{}: mode '{}' is not octal", file.path, mode));
            }
        }
        for content in &self.file_content {
            for pattern in &content.matches {
                if let Err(e) = Regex::new(pattern) {
                    problems.push(format!("{}: invalid pattern '{}': {}", content.path, pattern, e));
                }
            }
        }
        for cmd in &self.commands {
            if cmd.command.trim().is_empty() {
                problems.push("command with empty command line".to_string());
            }
            if let Some(pattern) = &cmd.stdout_matches
                && let Err(e) = Regex::new(pattern)
            {
                problems.push(format!(
                    "{}: invalid pattern '{}': {}",
                    cmd.display_name(),
                    pattern,
                    e
                ));
            }
        }

        problems
    }
}

/// Expand spec arguments: files are taken as-is, directories contribute
/// their `*.toml` files in name order.
pub fn collect_paths(args: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for arg in args {
        if arg.is_dir() {
            let mut found: Vec<PathBuf> = fs::read_dir(arg)
                .with_context(|| format!("Could not read directory: {}", arg.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
                .collect();
            found.sort();
            if found.is_empty() {
                log::warn!("No .toml specs in {}", arg.display());
            }
            paths.extend(found);
        } else {
            paths.push(arg.clone());
        }
    }
    Ok(paths)
}
