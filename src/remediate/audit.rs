//! Append-only transaction log
//!
//! Every state transition in a remediation session is appended as one JSON
//! line and fsynced before the next mutation touches the tree. The log is
//! never truncated within a session; pruning is a separate maintenance entry
//! point.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuditError, Result};
use crate::report::STATE_DIR;

/// Log file name under the state directory
const AUDIT_LOG_FILE: &str = "audit.log";

/// Executor state machine positions recorded in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    Loaded,
    Prechecked,
    Stale,
    BackedUp,
    Applied,
    Verified,
    Committed,
    RolledBack,
    Skipped,
    RequiresManual,
    Aborted,
}

impl TxState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::Prechecked => "prechecked",
            Self::Stale => "stale",
            Self::BackedUp => "backed_up",
            Self::Applied => "applied",
            Self::Verified => "verified",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
            Self::Skipped => "skipped",
            Self::RequiresManual => "requires_manual",
            Self::Aborted => "aborted",
        }
    }
}

/// One line of the transaction log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// ISO-8601 UTC timestamp
    pub timestamp: String,

    /// Finding this transition belongs to; empty for session-level entries
    pub finding_id: String,

    /// State reached
    pub state: TxState,

    /// Operator decision, when one was made at this transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_decision: Option<String>,

    /// Tree state (HEAD sha) before the transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_hash: Option<String>,

    /// Tree state after the transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_hash: Option<String>,

    /// Verifier outcome, when one was produced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifier_outcome: Option<String>,

    /// Free-form reason (skip cause, failure detail)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TransactionRecord {
    pub fn new(finding_id: &str, state: TxState, now: DateTime<Utc>) -> Self {
        Self {
            timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            finding_id: finding_id.to_string(),
            state,
            operator_decision: None,
            pre_hash: None,
            post_hash: None,
            verifier_outcome: None,
            detail: None,
        }
    }

    pub fn with_decision(mut self, decision: &str) -> Self {
        self.operator_decision = Some(decision.to_string());
        self
    }

    pub fn with_pre_hash(mut self, sha: &str) -> Self {
        self.pre_hash = Some(sha.to_string());
        self
    }

    pub fn with_post_hash(mut self, sha: &str) -> Self {
        self.post_hash = Some(sha.to_string());
        self
    }

    pub fn with_verifier(mut self, outcome: &str) -> Self {
        self.verifier_outcome = Some(outcome.to_string());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Single-writer append-only log handle
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    file: File,
}

impl AuditLog {
    /// Path of the log under a repository root
    pub fn path_for(root: &Path) -> PathBuf {
        root.join(STATE_DIR).join(AUDIT_LOG_FILE)
    }

    /// Open (or create) the log for appending
    pub fn open(root: &Path) -> Result<Self> {
        crate::report::ensure_state_dir(root)?;
        let path = Self::path_for(root);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AuditError::AuditLogFailed {
                message: format!("{}: {}", path.display(), e),
            })?;
        Ok(Self { path, file })
    }

    /// Append one record and fsync. A failed append is fatal to the session.
    pub fn append(&mut self, record: &TransactionRecord) -> Result<()> {
        let mut write = || -> std::io::Result<()> {
            let mut line = serde_json::to_vec(record)?;
            line.push(b'\n');
            self.file.write_all(&line)?;
            self.file.sync_all()
        };
        write().map_err(|e| AuditError::AuditLogFailed {
            message: format!("{}: {}", self.path.display(), e),
        })
    }
}

/// Read every record in the log (tolerates a missing file)
pub fn read_log(root: &Path) -> Result<Vec<TransactionRecord>> {
    let path = AuditLog::path_for(root);
    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut records = Vec::new();
    for line in contents.lines() {
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed audit log line");
            }
        }
    }
    Ok(records)
}

/// Maintenance: drop entries older than the cutoff. Never called inside a
/// session. Returns how many entries were removed.
pub fn prune_log(root: &Path, older_than_days: i64, now: DateTime<Utc>) -> Result<usize> {
    let records = read_log(root)?;
    if records.is_empty() {
        return Ok(0);
    }
    let cutoff = now.timestamp() - older_than_days * 86_400;

    let (kept, dropped): (Vec<_>, Vec<_>) = records.into_iter().partition(|r| {
        DateTime::parse_from_rfc3339(&r.timestamp)
            .map(|t| t.timestamp() >= cutoff)
            .unwrap_or(true)
    });

    let mut contents = Vec::new();
    for record in &kept {
        contents.extend(serde_json::to_vec(record)?);
        contents.push(b'\n');
    }
    crate::fs_utils::write_atomic(&AuditLog::path_for(root), &contents)?;
    Ok(dropped.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = AuditLog::open(dir.path()).unwrap();
        let now = Utc::now();

        log.append(&TransactionRecord::new("f1", TxState::Loaded, now))
            .unwrap();
        log.append(
            &TransactionRecord::new("f1", TxState::Committed, now)
                .with_pre_hash("aaa")
                .with_post_hash("bbb")
                .with_verifier("PASSED"),
        )
        .unwrap();

        let records = read_log(dir.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].state, TxState::Loaded);
        assert_eq!(records[1].verifier_outcome.as_deref(), Some("PASSED"));
        assert_eq!(records[1].pre_hash.as_deref(), Some("aaa"));
    }

    #[test]
    fn test_append_only_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        {
            let mut log = AuditLog::open(dir.path()).unwrap();
            log.append(&TransactionRecord::new("f1", TxState::Loaded, now))
                .unwrap();
        }
        {
            let mut log = AuditLog::open(dir.path()).unwrap();
            log.append(&TransactionRecord::new("f2", TxState::Loaded, now))
                .unwrap();
        }
        let records = read_log(dir.path()).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_prune_by_age() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = AuditLog::open(dir.path()).unwrap();

        let old = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let recent = DateTime::parse_from_rfc3339("2026-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        log.append(&TransactionRecord::new("f-old", TxState::Committed, old))
            .unwrap();
        log.append(&TransactionRecord::new("f-new", TxState::Committed, recent))
            .unwrap();

        let now = DateTime::parse_from_rfc3339("2026-06-02T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let removed = prune_log(dir.path(), 30, now).unwrap();
        assert_eq!(removed, 1);

        let records = read_log(dir.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].finding_id, "f-new");
    }

    #[test]
    fn test_read_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_log(dir.path()).unwrap().is_empty());
    }
}
