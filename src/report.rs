//! Report store
//!
//! Persists scan reports as self-contained JSON documents under
//! `.debloat/reports/`. Writes are atomic (write-then-rename with a
//! directory fsync) and reports never mutate after emission; a re-scan
//! produces a new report with a new scan id.
//!
//! Reports are content-addressable: the digest covers the canonical findings
//! serialization, so two reports with identical sorted findings share a
//! digest regardless of scan id and timestamp.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::{AuditError, Result};
use crate::fs_utils::write_atomic;
use crate::schema::{fnv1a_hash, ScanReport, SCHEMA_VERSION};

/// Directory under the repo root holding engine state
pub const STATE_DIR: &str = ".debloat";

/// Subdirectory for persisted reports
const REPORTS_DIR: &str = "reports";

/// Create the state directory and keep it invisible to the VCS. Engine state
/// must never ride along in a remediation commit: a later rollback would
/// otherwise rewind the audit log itself.
pub fn ensure_state_dir(root: &Path) -> std::io::Result<PathBuf> {
    let dir = root.join(STATE_DIR);
    std::fs::create_dir_all(&dir)?;
    let gitignore = dir.join(".gitignore");
    if !gitignore.exists() {
        std::fs::write(&gitignore, "*\n")?;
    }
    Ok(dir)
}

/// On-disk report store rooted at a repository
#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

/// Summary row for `list`
#[derive(Debug, Clone)]
pub struct StoredReport {
    pub path: PathBuf,
    pub scan_id: String,
    pub scan_timestamp: String,
    pub tier: u8,
    pub finding_count: usize,
    pub digest: String,
}

impl ReportStore {
    /// Store under `<root>/.debloat/reports`
    pub fn new(root: &Path) -> Self {
        Self {
            dir: root.join(STATE_DIR).join(REPORTS_DIR),
        }
    }

    /// Store at an explicit directory
    pub fn at(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a report atomically. Returns the file path and content digest.
    pub fn write(&self, report: &ScanReport) -> Result<(PathBuf, String)> {
        if let Some(state_dir) = self.dir.parent() {
            if state_dir.ends_with(STATE_DIR) {
                if let Some(root) = state_dir.parent() {
                    ensure_state_dir(root)?;
                }
            }
        }
        let digest = report_digest(report);
        let path = self.dir.join(format!("scan-{}.json", report.scan_id));

        let mut serialized = serde_json::to_vec_pretty(report)?;
        serialized.push(b'\n');
        write_atomic(&path, &serialized)?;

        Ok((path, digest))
    }

    /// Read and validate a report. Incompatible schema versions are refused
    /// with a remediation hint rather than misread.
    pub fn read(&self, path: &Path) -> Result<ScanReport> {
        read_report(path)
    }

    /// All stored reports, newest first
    pub fn list(&self) -> Result<Vec<StoredReport>> {
        let mut reports = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(_) => return Ok(reports),
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_report(&path) {
                Ok(report) => reports.push(StoredReport {
                    digest: report_digest(&report),
                    scan_id: report.scan_id,
                    scan_timestamp: report.scan_timestamp,
                    tier: report.tier,
                    finding_count: report.findings.len(),
                    path,
                }),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unreadable report skipped");
                }
            }
        }
        reports.sort_by(|a, b| b.scan_timestamp.cmp(&a.scan_timestamp));
        Ok(reports)
    }

    /// Delete reports older than the cutoff. Returns how many were removed.
    pub fn prune(&self, older_than_days: i64, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now.timestamp() - older_than_days * 86_400;
        let mut removed = 0;
        for stored in self.list()? {
            let timestamp = DateTime::parse_from_rfc3339(&stored.scan_timestamp)
                .map(|t| t.timestamp())
                .unwrap_or(i64::MAX);
            if timestamp < cutoff {
                std::fs::remove_file(&stored.path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Read one report file with schema validation
pub fn read_report(path: &Path) -> Result<ScanReport> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AuditError::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            AuditError::Io(e)
        }
    })?;
    let report: ScanReport =
        serde_json::from_str(&contents).map_err(|e| AuditError::ReportError {
            message: format!("{}: {}", path.display(), e),
        })?;
    if report.schema_version != SCHEMA_VERSION {
        return Err(AuditError::SchemaVersionMismatch {
            found: report.schema_version,
            supported: SCHEMA_VERSION,
        });
    }
    Ok(report)
}

/// Content digest over the canonical findings serialization
pub fn report_digest(report: &ScanReport) -> String {
    let canonical = serde_json::to_string(&report.findings).unwrap_or_default();
    format!("{:016x}", fnv1a_hash(&canonical))
}
