#![allow(clippy::result_large_err)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

//! debloat-engine: codebase bloat auditor with transactional remediation
//!
//! Scans a source tree, fuses heuristic, git-historical, static-analysis and
//! similarity signals into ranked findings with calibrated confidence, and
//! applies approved remediations reversibly: backup, apply, verify, commit,
//! with automatic rollback when verification fails.
//!
//! # Pipeline
//!
//! Scan: collectors -> fusion -> aggregation -> report store.
//! Remediation: report store -> executor -> verifier.
//!
//! # Example
//!
//! ```ignore
//! use debloat_engine::config::AuditConfig;
//! use debloat_engine::scan::run_scan_and_store;
//! use std::sync::{atomic::AtomicBool, Arc};
//!
//! let config = AuditConfig::load(std::path::Path::new("."))?;
//! let outcome = run_scan_and_store(config, Arc::new(AtomicBool::new(false)))?;
//! for finding in &outcome.report.findings {
//!     println!("{} {}", finding.bloat_score, finding.artifact_path);
//! }
//! ```

pub mod adapters;
pub mod aggregate;
pub mod artifacts;
pub mod cli;
pub mod collectors;
pub mod commands;
pub mod config;
pub mod error;
pub mod fs_utils;
pub mod fusion;
pub mod git;
pub mod refcheck;
pub mod remediate;
pub mod report;
pub mod scan;
pub mod schema;
pub mod verify;

pub use cli::{Cli, Command};
pub use error::{AuditError, Result};

// Re-export the data model
pub use schema::{
    compute_finding_id, fnv1a_hash, Artifact, ArtifactKind, ConfidenceBand, Evidence,
    EvidenceSource, Finding, FocusArea, ObservedValue, Recommendation, RiskTier, ScanReport,
    Severity, SignalKind, ToolStatus, SCHEMA_VERSION,
};

// Re-export the scan pipeline
pub use aggregate::aggregate;
pub use artifacts::{collect_artifacts, is_generated, stable_content_hash};
pub use collectors::{
    default_collectors, run_collectors, Collector, DependencyCollector, GitHistoryCollector,
    HeuristicCollector, ScanContext, SimilarityCollector, StaticAnalysisCollector,
};
pub use config::{AuditConfig, AutoApprovePolicy, DirRole, DirectoryConventions, Thresholds};
pub use fusion::{accumulate, fuse, sort_findings, FusedScore};
pub use scan::{build_context, run_scan, run_scan_and_store, run_scan_with, ScanOutcome};

// Re-export the adapter layer
pub use adapters::{
    builtin_adapters, discover, AdapterOutcome, DiscoveredAdapter, ToolAdapter, ToolInfo,
};

// Re-export the report store
pub use report::{read_report, report_digest, ReportStore, StoredReport, STATE_DIR};

// Re-export the remediation executor
pub use remediate::{
    action_preview, execute_session, prune_log, read_log, ActionOutcome, ApproveAll, AuditLog,
    Decision, DecisionCallback, ExecutorOptions, ScriptedDecisions, SessionSummary,
    TransactionOutcome, TransactionRecord, TxOutcome, TxState, ARCHIVE_PREFIX,
};

// Re-export verification
pub use verify::{DefaultVerifier, Verifier, VerifierResult};

// Re-export git helpers
pub use git::{
    collect_file_stats, commit_all, create_backup_branch, head_sha, is_git_repo,
    is_worktree_clean, reset_hard, FileGitStats,
};

// Re-export the reference checker
pub use refcheck::{Reference, ReferenceChecker};
