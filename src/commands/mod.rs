//! Command handlers for the debloat-engine CLI
//!
//! Each module implements one top-level command:
//! - `scan` - run the evidence pipeline and store a report
//! - `remediate` - apply a stored report transactionally
//! - `report` - list, show, prune reports and the transaction log
//! - `tools` - show the adapter availability snapshot
//!
//! Handlers take their `Args` struct from `cli.rs` plus a shared
//! `CommandContext`, and return the text to print.

pub mod remediate;
pub mod report;
pub mod scan;
pub mod tools;

pub use remediate::run_remediate;
pub use report::run_report;
pub use scan::run_scan_command;
pub use tools::run_tools;

use std::path::PathBuf;

/// Shared context passed to all command handlers
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Repository root
    pub root: PathBuf,

    /// Show verbose output
    pub verbose: bool,
}

impl CommandContext {
    pub fn new(root: Option<PathBuf>, verbose: bool) -> std::io::Result<Self> {
        let root = match root {
            Some(r) => r,
            None => std::env::current_dir()?,
        };
        Ok(Self { root, verbose })
    }
}
