//! CLI argument definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Codebase bloat auditor with transactional remediation
#[derive(Parser, Debug)]
#[command(name = "debloat-engine")]
#[command(about = "Scans a source tree for bloat and applies approved remediations reversibly")]
#[command(version)]
pub struct Cli {
    /// Repository root (default: current directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub root: Option<PathBuf>,

    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan the tree and store a ranked findings report
    Scan(ScanArgs),

    /// Apply a stored report under operator approval
    Remediate(RemediateArgs),

    /// Inspect and maintain stored reports
    Report(ReportArgs),

    /// Show which external analyzers the next scan will find
    Tools,
}

#[derive(clap::Args, Debug)]
pub struct ScanArgs {
    /// Target analysis tier (1-3); demoted if tools are absent
    #[arg(long, value_name = "TIER")]
    pub tier: Option<u8>,

    /// Restrict collectors: comma-separated subset of code,docs,dependencies,git
    #[arg(long, value_delimiter = ',', value_name = "AREA")]
    pub focus: Vec<String>,

    /// Print every finding instead of the top entries
    #[arg(long)]
    pub full: bool,
}

#[derive(clap::Args, Debug)]
pub struct RemediateArgs {
    /// Report file to apply (default: the most recent stored report)
    #[arg(value_name = "REPORT")]
    pub report: Option<PathBuf>,

    /// Walk the state machine without touching the tree
    #[arg(long)]
    pub dry_run: bool,

    /// Continue an interrupted session
    #[arg(long)]
    pub resume: bool,

    /// Approve every finding without prompting
    #[arg(long)]
    pub yes: bool,
}

#[derive(clap::Args, Debug)]
pub struct ReportArgs {
    #[command(subcommand)]
    pub operation: ReportOperation,
}

#[derive(Subcommand, Debug)]
pub enum ReportOperation {
    /// List stored reports, newest first
    List,

    /// Render one report's ranked findings
    Show {
        /// Report file path
        #[arg(value_name = "REPORT")]
        report: PathBuf,
    },

    /// Delete reports older than a cutoff
    Prune {
        /// Age cutoff in days
        #[arg(long, default_value = "90", value_name = "DAYS")]
        older_than_days: i64,
    },

    /// Drop transaction-log entries older than a cutoff
    PruneLog {
        /// Age cutoff in days
        #[arg(long, default_value = "180", value_name = "DAYS")]
        older_than_days: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_args_parse() {
        let cli = Cli::parse_from(["debloat-engine", "scan", "--tier", "2", "--focus", "code,git"]);
        match cli.command {
            Command::Scan(args) => {
                assert_eq!(args.tier, Some(2));
                assert_eq!(args.focus, vec!["code", "git"]);
            }
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn test_remediate_flags() {
        let cli = Cli::parse_from(["debloat-engine", "remediate", "--dry-run", "--yes"]);
        match cli.command {
            Command::Remediate(args) => {
                assert!(args.dry_run);
                assert!(args.yes);
                assert!(args.report.is_none());
            }
            _ => panic!("expected remediate"),
        }
    }

    #[test]
    fn test_report_prune_default_cutoff() {
        let cli = Cli::parse_from(["debloat-engine", "report", "prune"]);
        match cli.command {
            Command::Report(args) => match args.operation {
                ReportOperation::Prune { older_than_days } => assert_eq!(older_than_days, 90),
                _ => panic!("expected prune"),
            },
            _ => panic!("expected report"),
        }
    }
}
