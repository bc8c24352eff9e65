use crate::report::Format;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vigil")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Verify that machines match declared state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check hosts against spec files
    Run(RunArgs),

    /// Parse spec files and report problems without running anything
    Validate {
        /// Spec files or directories of *.toml specs
        #[arg(required = true)]
        specs: Vec<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct RunArgs {
    /// Spec files or directories of *.toml specs
    pub specs: Vec<PathBuf>,

    /// Hosts to check (comma-separated): local, host, user@host:port
    #[arg(long, value_delimiter = ',')]
    pub hosts: Vec<String>,

    /// TOML inventory of hosts
    #[arg(short, long, env = "VIGIL_INVENTORY")]
    pub inventory: Option<PathBuf>,

    /// Number of hosts checked in parallel
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Stop the whole run at the first failing host
    #[arg(long)]
    pub fail_fast: bool,

    /// Connection attempts per host, including the first
    #[arg(long)]
    pub retries: Option<u32>,

    /// Deadline for the whole run, in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    pub format: Format,

    /// Report hosts sorted by target instead of completion order
    #[arg(long)]
    pub sort: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_args() {
        let cli = Cli::parse_from([
            "vigil", "-vv", "run", "web.toml", "db.toml", "--hosts", "web1,deploy@web2:2222", "-j",
            "4", "--fail-fast", "--format", "json",
        ]);
        assert_eq!(cli.verbose, 2);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.specs.len(), 2);
        assert_eq!(args.hosts, vec!["web1", "deploy@web2:2222"]);
        assert_eq!(args.jobs, Some(4));
        assert!(args.fail_fast);
        assert_eq!(args.format, Format::Json);
    }
}
