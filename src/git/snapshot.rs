//! Reversible working-tree primitives for the remediation executor
//!
//! Every destructive action goes through git so the change is recoverable by
//! resetting to the session backup branch. The executor refuses to run
//! without a repository; these helpers assume one exists.

use std::path::Path;
use std::process::{Command, Stdio};

use super::{git_command, git_command_optional};
use crate::error::{AuditError, Result};

/// True when `git status --porcelain` reports nothing
pub fn is_worktree_clean(root: &Path) -> Result<bool> {
    let output = git_command(&["status", "--porcelain"], Some(root))?;
    Ok(output.is_empty())
}

/// Whether a local branch exists
pub fn branch_exists(root: &Path, name: &str) -> bool {
    git_command_optional(
        &["rev-parse", "--verify", "--quiet", &format!("refs/heads/{}", name)],
        Some(root),
    )
    .is_some()
}

/// Create the session backup branch at the current HEAD
pub fn create_backup_branch(root: &Path, name: &str) -> Result<()> {
    if branch_exists(root, name) {
        return Err(AuditError::BackupFailed {
            message: format!("backup branch '{}' already exists", name),
        });
    }
    git_command(&["branch", name], Some(root)).map_err(|e| AuditError::BackupFailed {
        message: e.to_string(),
    })?;
    Ok(())
}

/// Delete a backup branch (post-session cleanup)
pub fn delete_branch(root: &Path, name: &str) -> Result<()> {
    git_command(&["branch", "-D", name], Some(root))?;
    Ok(())
}

/// Hard-reset the working tree and index to a ref
pub fn reset_hard(root: &Path, reference: &str) -> Result<()> {
    git_command(&["reset", "--hard", reference], Some(root))?;
    Ok(())
}

/// Remove a tracked path through git so the deletion is staged
pub fn delete_path(root: &Path, path: &str) -> Result<()> {
    git_command(&["rm", "-q", "--", path], Some(root))?;
    Ok(())
}

/// Move a tracked path, creating destination directories first so `git mv`
/// preserves history.
pub fn move_path(root: &Path, from: &str, to: &str) -> Result<()> {
    let destination = root.join(to);
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)?;
    }
    git_command(&["mv", "--", from, to], Some(root))?;
    Ok(())
}

/// Apply a unified diff to the working tree and index
pub fn apply_patch(root: &Path, patch: &str) -> Result<()> {
    let mut child = Command::new("git")
        .args(["apply", "--index", "-"])
        .current_dir(root)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| AuditError::GitError {
            message: format!("Failed to execute git apply: {}", e),
        })?;

    if let Some(stdin) = child.stdin.as_mut() {
        use std::io::Write;
        stdin.write_all(patch.as_bytes())?;
    }
    drop(child.stdin.take());

    let output = child.wait_with_output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AuditError::GitError {
            message: format!("git apply failed: {}", stderr.trim()),
        });
    }
    Ok(())
}

/// Stage everything and commit. Returns the new HEAD sha.
pub fn commit_all(root: &Path, message: &str) -> Result<String> {
    git_command(&["add", "-A"], Some(root))?;
    git_command(&["commit", "-q", "--no-verify", "-m", message], Some(root))?;
    git_command(&["rev-parse", "HEAD"], Some(root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command;

    fn init_repo(dir: &Path) {
        for args in [
            vec!["init", "-q"],
            vec!["config", "user.email", "audit@test"],
            vec!["config", "user.name", "Audit Test"],
        ] {
            Command::new("git")
                .current_dir(dir)
                .args(&args)
                .output()
                .expect("git");
        }
    }

    #[test]
    fn test_backup_branch_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        fs::write(dir.path().join("a.txt"), "a\n").unwrap();
        commit_all(dir.path(), "init").unwrap();

        create_backup_branch(dir.path(), "debloat/backup-test").unwrap();
        assert!(branch_exists(dir.path(), "debloat/backup-test"));

        // Creating the same branch twice is a backup failure
        assert!(create_backup_branch(dir.path(), "debloat/backup-test").is_err());

        delete_branch(dir.path(), "debloat/backup-test").unwrap();
        assert!(!branch_exists(dir.path(), "debloat/backup-test"));
    }

    #[test]
    fn test_delete_and_reset_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        fs::write(dir.path().join("doomed.txt"), "bytes\n").unwrap();
        let pre = commit_all(dir.path(), "add doomed").unwrap();

        delete_path(dir.path(), "doomed.txt").unwrap();
        commit_all(dir.path(), "remove doomed").unwrap();
        assert!(!dir.path().join("doomed.txt").exists());

        reset_hard(dir.path(), &pre).unwrap();
        assert!(dir.path().join("doomed.txt").exists());
    }

    #[test]
    fn test_move_preserves_content() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        fs::write(dir.path().join("old.txt"), "content\n").unwrap();
        commit_all(dir.path(), "add").unwrap();

        move_path(dir.path(), "old.txt", "archive/old.txt").unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("archive/old.txt")).unwrap(),
            "content\n"
        );
        assert!(!dir.path().join("old.txt").exists());
    }

    #[test]
    fn test_worktree_clean_detection() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        fs::write(dir.path().join("a.txt"), "a\n").unwrap();
        commit_all(dir.path(), "init").unwrap();
        assert!(is_worktree_clean(dir.path()).unwrap());

        fs::write(dir.path().join("b.txt"), "b\n").unwrap();
        assert!(!is_worktree_clean(dir.path()).unwrap());
    }
}
