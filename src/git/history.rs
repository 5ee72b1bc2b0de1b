//! Per-file history statistics from a single log traversal
//!
//! One `git log` pass over the whole repository builds every statistic the
//! git collector needs: last-touch age, churn inside the lookback window,
//! author dispersion and orphan status. Per-file subprocess calls would cost
//! a fork per artifact on large trees.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};

use super::git_command_optional;
use crate::error::Result;

/// History statistics for one tracked file
#[derive(Debug, Clone, Default)]
pub struct FileGitStats {
    /// Epoch seconds of the newest commit touching the file
    pub last_commit_epoch: i64,

    /// Commits touching the file inside the churn window
    pub commits_in_window: usize,

    /// Total commits ever touching the file
    pub total_commits: usize,

    /// Distinct authors ever touching the file
    pub author_count: usize,

    /// True when the file was added once and never modified after
    pub added_never_modified: bool,
}

impl FileGitStats {
    /// Days since the last commit touched the file
    pub fn days_since_last_commit(&self, now: DateTime<Utc>) -> i64 {
        (now.timestamp() - self.last_commit_epoch) / 86_400
    }
}

/// Walk the full commit log once and aggregate per-file statistics.
///
/// `window_days` bounds the churn count; `now` is injected so tests can pin
/// the clock.
pub fn collect_file_stats(
    root: &Path,
    window_days: i64,
    now: DateTime<Utc>,
) -> Result<HashMap<String, FileGitStats>> {
    // Commit header: epoch|author, followed by name-status lines. A repo
    // with no commits yet has no history to aggregate.
    let output = match git_command_optional(
        &["log", "--format=%x01%at|%an", "--name-status"],
        Some(root),
    ) {
        Some(o) => o,
        None => return Ok(HashMap::new()),
    };

    let window_start = now.timestamp() - window_days * 86_400;

    let mut stats: HashMap<String, FileGitStats> = HashMap::new();
    let mut authors: HashMap<String, HashSet<String>> = HashMap::new();
    // Status of the oldest touch seen so far (log is newest-first, so the
    // last touch we see per file is its introduction).
    let mut oldest_status: HashMap<String, char> = HashMap::new();

    let mut commit_epoch: i64 = 0;
    let mut commit_author = String::new();

    for line in output.lines() {
        if let Some(header) = line.strip_prefix('\u{0001}') {
            let mut parts = header.splitn(2, '|');
            commit_epoch = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            commit_author = parts.next().unwrap_or("").to_string();
            continue;
        }
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split('\t');
        let status = match fields.next().and_then(|s| s.chars().next()) {
            Some(c) => c,
            None => continue,
        };
        // Renames and copies carry two paths; the last field is the current one
        let path = match fields.last() {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => continue,
        };

        let entry = stats.entry(path.clone()).or_default();
        entry.total_commits += 1;
        if commit_epoch > entry.last_commit_epoch {
            entry.last_commit_epoch = commit_epoch;
        }
        if commit_epoch >= window_start {
            entry.commits_in_window += 1;
        }
        authors
            .entry(path.clone())
            .or_default()
            .insert(commit_author.clone());
        oldest_status.insert(path, status);
    }

    for (path, entry) in stats.iter_mut() {
        entry.author_count = authors.get(path).map(|a| a.len()).unwrap_or(0);
        entry.added_never_modified =
            entry.total_commits == 1 && oldest_status.get(path) == Some(&'A');
    }

    Ok(stats)
}

/// Author-time (epoch seconds) of the commit that last modified a line,
/// via `git blame --porcelain`. None when blame is unavailable.
pub fn blame_line_epoch(root: &Path, file: &str, line: usize) -> Option<i64> {
    let range = format!("{},{}", line, line);
    let output = git_command_optional(
        &["blame", "-L", &range, "--porcelain", "--", file],
        Some(root),
    )?;

    for blame_line in output.lines() {
        if let Some(epoch) = blame_line.strip_prefix("author-time ") {
            return epoch.trim().parse().ok();
        }
    }
    None
}
