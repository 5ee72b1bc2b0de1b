//! Common test fixtures for debloat-engine integration tests
//!
//! `TestRepo` builds a throwaway git repository with controllable commit
//! dates, which is what the staleness and orphan signals key off.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use tempfile::TempDir;

use debloat_engine::config::AuditConfig;

/// Builder for git-backed test repositories
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    /// Create an initialized git repository with a configured identity
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        for args in [
            vec!["init", "-q", "-b", "main"],
            vec!["config", "user.email", "audit@test"],
            vec!["config", "user.name", "Audit Test"],
        ] {
            run_git(dir.path(), &args, None);
        }
        Self { dir }
    }

    /// Create a plain directory with no VCS
    pub fn without_git() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file, creating parent directories
    pub fn add_file(&self, relative_path: &str, content: &str) -> &Self {
        let full_path = self.dir.path().join(relative_path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        std::fs::write(&full_path, content).expect("Failed to write file");
        self
    }

    /// Stage and commit everything at the current time
    pub fn commit_all(&self, message: &str) -> String {
        self.commit_all_at(message, Utc::now())
    }

    /// Stage and commit everything with a pinned author/committer date
    pub fn commit_all_at(&self, message: &str, date: DateTime<Utc>) -> String {
        let stamp = date.to_rfc3339_opts(SecondsFormat::Secs, true);
        run_git(self.path(), &["add", "-A"], None);
        run_git(
            self.path(),
            &["commit", "-q", "--no-verify", "-m", message],
            Some(&stamp),
        );
        run_git(self.path(), &["rev-parse", "HEAD"], None)
    }

    /// Commit with a date `days` in the past
    pub fn commit_all_days_ago(&self, message: &str, days: i64) -> String {
        self.commit_all_at(message, Utc::now() - Duration::days(days))
    }

    /// A default config rooted at this repository
    pub fn config(&self) -> AuditConfig {
        let mut config = AuditConfig::default();
        config.root = PathBuf::from(self.path());
        config
    }

    /// Generate a source file body of roughly `lines` lines
    pub fn python_module(lines: usize, prefix: &str) -> String {
        let mut body = String::new();
        for i in 0..(lines / 2) {
            body.push_str(&format!("def {}_{}():\n    return {}\n", prefix, i, i));
        }
        body
    }
}

fn run_git(dir: &Path, args: &[&str], date: Option<&str>) -> String {
    let mut cmd = Command::new("git");
    cmd.current_dir(dir).args(args);
    if let Some(stamp) = date {
        cmd.env("GIT_AUTHOR_DATE", stamp);
        cmd.env("GIT_COMMITTER_DATE", stamp);
    }
    let output = cmd.output().expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}
