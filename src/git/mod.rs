//! Git operations for history analysis and remediation
//!
//! Subprocess-based git integration. History queries feed the git collector;
//! the snapshot submodule provides the reversible primitives the remediation
//! executor depends on.

mod history;
mod snapshot;

pub use history::{blame_line_epoch, collect_file_stats, FileGitStats};
pub use snapshot::{
    apply_patch, branch_exists, commit_all, create_backup_branch, delete_branch, delete_path,
    is_worktree_clean, move_path, reset_hard,
};

use std::path::Path;
use std::process::Command;

use crate::error::{AuditError, Result};

/// Run a git command and return stdout as string
pub fn git_command(args: &[&str], cwd: Option<&Path>) -> Result<String> {
    let mut cmd = Command::new("git");
    cmd.args(args);

    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd.output().map_err(|e| AuditError::GitError {
        message: format!("Failed to execute git: {}", e),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AuditError::GitError {
            message: format!("git {} failed: {}", args.join(" "), stderr.trim()),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Run a git command, returning None if it fails (for optional queries)
pub fn git_command_optional(args: &[&str], cwd: Option<&Path>) -> Option<String> {
    git_command(args, cwd).ok()
}

/// Check if a directory is inside a git repository
pub fn is_git_repo(cwd: &Path) -> bool {
    git_command_optional(&["rev-parse", "--git-dir"], Some(cwd)).is_some()
}

/// SHA of HEAD, or None in an empty or absent repository
pub fn head_sha(cwd: &Path) -> Option<String> {
    git_command_optional(&["rev-parse", "HEAD"], Some(cwd))
}
