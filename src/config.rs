//! User configuration (`config.toml`) and host inventories
//!
//! Both files are optional. Command-line flags override anything set here.

use crate::paths;
use anyhow::{Context, Result};
use serde::Deserialize;
use sshkit::{HostKeyPolicy, RetryConfig, SshOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// config.toml
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VigilConfig {
    pub run: RunConfig,
    pub connect: ConnectConfig,
    pub ssh: SshConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Worker count; defaults to the number of CPUs
    pub jobs: Option<usize>,
    pub fail_fast: bool,
    /// Deadline for the whole run
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectConfig {
    /// Connection attempts per host, including the first
    pub retries: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay_ms: 500,
            backoff_factor: 2.0,
            max_delay_ms: 10_000,
            timeout_secs: 10,
        }
    }
}

impl ConnectConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retries.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff_factor: self.backoff_factor,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SshConfig {
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_file: Option<String>,
    pub strict_host_key_checking: HostKeyPolicy,
    pub extra_options: Vec<String>,
}

impl VigilConfig {
    /// Load the config file, or defaults when it does not exist
    pub fn load() -> Result<Self> {
        let path = paths::config_file()?;
        if !path.exists() {
            log::debug!("No config file at {}", path.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))
    }

    pub fn ssh_options(&self) -> SshOptions {
        SshOptions {
            user: self.ssh.user.clone(),
            port: self.ssh.port,
            identity_file: self.ssh.identity_file.as_deref().map(paths::expand),
            connect_timeout: Duration::from_secs(self.connect.timeout_secs.max(1)),
            host_key_policy: self.ssh.strict_host_key_checking,
            extra_options: self.ssh.extra_options.clone(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Inventory
// ============================================================================

/// Hosts file passed with `--inventory`
///
/// ```toml
/// hosts = ["web1", "deploy@web2:2222"]
///
/// [[host]]
/// target = "db1"
/// specs = ["db.toml"]
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Inventory {
    /// Hosts checked against the specs given on the command line
    pub hosts: Vec<String>,
    /// Hosts with their own spec files
    #[serde(rename = "host")]
    pub entries: Vec<InventoryHost>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InventoryHost {
    pub target: String,
    /// Spec files, relative to the inventory file; empty means the command-line specs
    #[serde(default)]
    pub specs: Vec<String>,
}

/// One host and the spec files it is checked against (`None` = command-line specs)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedHost {
    pub target: String,
    pub specs: Option<Vec<PathBuf>>,
}

impl Inventory {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read inventory: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid inventory format in {}", path.display()))
    }

    /// Flatten into planned hosts, resolving spec paths against `base`
    pub fn planned(&self, base: &Path) -> Vec<PlannedHost> {
        let plain = self.hosts.iter().map(|h| PlannedHost {
            target: h.clone(),
            specs: None,
        });
        let detailed = self.entries.iter().map(|e| PlannedHost {
            target: e.target.clone(),
            specs: (!e.specs.is_empty())
                .then(|| e.specs.iter().map(|s| paths::resolve_from(base, s)).collect()),
        });
        plain.chain(detailed).collect()
    }
}
