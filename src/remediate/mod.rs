//! Transactional remediation executor
//!
//! Applies approved findings under a strict state machine:
//!
//! ```text
//! LOADED -> PRECHECKED -> BACKED_UP -> APPLIED -> VERIFIED -> COMMITTED
//!                |            |           |           |
//!                +-- STALE ---+           |     VERIFY_FAIL -> ROLLED_BACK
//! ```
//!
//! The executor never "tries and sees": every transaction is backed by the
//! session snapshot branch, applied through VCS primitives, verified, and
//! only then committed. The transaction log is appended and fsynced at every
//! transition; on restart any in-flight transaction is rolled back to its
//! pre-state before operation resumes. A VCS is a hard prerequisite here,
//! unlike scanning.

pub mod actions;
pub mod audit;
pub mod decision;

pub use actions::{apply_action, ActionOutcome, ARCHIVE_PREFIX};
pub use audit::{prune_log, read_log, AuditLog, TransactionRecord, TxState};
pub use decision::{ApproveAll, Decision, DecisionCallback, ScriptedDecisions};

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::artifacts::stable_content_hash;
use crate::collectors::dependency::declared_dependencies;
use crate::config::AuditConfig;
use crate::error::{AuditError, Result};
use crate::fs_utils::write_atomic;
use crate::git;
use crate::refcheck::ReferenceChecker;
use crate::report::STATE_DIR;
use crate::schema::{fnv1a_hash, ArtifactKind, Finding, Recommendation, ScanReport};
use crate::verify::{Verifier, VerifierResult};

/// Session state file name under the state directory
const SESSION_STATE_FILE: &str = "session.json";

/// Executor options
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    /// Walk the state machine without mutating the tree
    pub dry_run: bool,

    /// Continue an interrupted session from its state file
    pub resume: bool,
}

/// Final outcome of one finding's transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxOutcome {
    Applied,
    RolledBack,
    Aborted,
    SkippedByOperator,
    SkippedStale,
    RequiresManual,
    DryRun,
}

/// Per-finding result row
#[derive(Debug, Clone)]
pub struct TransactionOutcome {
    pub finding_id: String,
    pub artifact_path: String,
    pub action: Recommendation,
    pub outcome: TxOutcome,
    pub verifier: Option<VerifierResult>,
}

/// Result of a remediation session
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub transactions: Vec<TransactionOutcome>,
    pub backup_branch: String,
    pub halted_early: bool,
}

/// Resumable session state, written atomically at every transition
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionState {
    backup_branch: String,
    completed: Vec<String>,
    in_flight: Option<InFlight>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InFlight {
    finding_id: String,
    pre_sha: String,
}

fn session_state_path(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join(SESSION_STATE_FILE)
}

fn read_session_state(root: &Path) -> Option<SessionState> {
    let contents = std::fs::read_to_string(session_state_path(root)).ok()?;
    serde_json::from_str(&contents).ok()
}

fn write_session_state(root: &Path, state: &SessionState) -> Result<()> {
    let mut serialized = serde_json::to_vec_pretty(state)?;
    serialized.push(b'\n');
    write_atomic(&session_state_path(root), &serialized)?;
    Ok(())
}

/// Human-readable preview of what applying a finding would do; hosts show it
/// when the operator asks to inspect.
pub fn action_preview(finding: &Finding) -> String {
    match finding.recommendation {
        Recommendation::Delete => format!("delete {}", finding.artifact_path),
        Recommendation::Archive => format!(
            "move {} -> {}/{}",
            finding.artifact_path, ARCHIVE_PREFIX, finding.artifact_path
        ),
        Recommendation::Consolidate => format!(
            "merge {} near-duplicates into {}",
            finding.affected_artifacts.len().saturating_sub(1),
            finding.artifact_path
        ),
        Recommendation::Refactor => match &finding.fix_patch {
            Some(patch) => format!("apply patch to {}:\n{}", finding.artifact_path, patch),
            None => format!("{}: refactor requires manual action", finding.artifact_path),
        },
        Recommendation::Keep => format!("{}: no action", finding.artifact_path),
    }
}

/// Execute a remediation session over a stored report.
pub fn execute_session(
    config: &AuditConfig,
    report: &ScanReport,
    verifier: &dyn Verifier,
    decision: &mut dyn DecisionCallback,
    cancel: Arc<AtomicBool>,
    options: &ExecutorOptions,
) -> Result<SessionSummary> {
    let root = config.root.as_path();

    // Remediation is transactional only with a VCS underneath
    if !git::is_git_repo(root) {
        return Err(AuditError::NotGitRepo);
    }

    let mut audit = AuditLog::open(root)?;

    // Crash recovery comes before the clean-tree check: an interrupted apply
    // leaves exactly the dirty state that rolling back removes.
    let prior = rollback_in_flight(root, &mut audit)?;

    // The snapshot can only capture committed state
    if !git::is_worktree_clean(root)? {
        return Err(AuditError::DirtyWorkTree);
    }

    let mut state = recover_or_start(root, config, &mut audit, options, prior)?;

    let mut ordered: Vec<&Finding> = report
        .findings
        .iter()
        .filter(|f| f.recommendation != Recommendation::Keep)
        .collect();
    // Safer actions first; deterministic within a tier
    ordered.sort_by(|a, b| {
        a.risk_tier
            .cmp(&b.risk_tier)
            .then_with(|| a.artifact_path.cmp(&b.artifact_path))
    });

    let checker = ReferenceChecker::new(root);
    let mut summary = SessionSummary {
        transactions: Vec::new(),
        backup_branch: state.backup_branch.clone(),
        halted_early: false,
    };
    let mut approved_tiers = HashSet::new();
    let mut aborted = false;

    for finding in ordered {
        if aborted {
            break;
        }
        // Operator interrupt: the previous transaction completed; halt now
        // and leave the session resumable.
        if cancel.load(Ordering::Relaxed) {
            summary.halted_early = true;
            tracing::info!("session interrupted; state file left for resume");
            return Ok(summary);
        }
        if state.completed.iter().any(|id| id == &finding.finding_id) {
            continue;
        }

        let outcome = run_transaction(
            root,
            config,
            finding,
            verifier,
            decision,
            &checker,
            &mut audit,
            &mut state,
            &mut approved_tiers,
            options,
        )?;

        if outcome.outcome == TxOutcome::Aborted {
            aborted = true;
        }
        let rolled_back_abort = outcome.outcome == TxOutcome::RolledBack
            && config.abort_on_verify_failure;
        summary.transactions.push(outcome);
        if rolled_back_abort {
            tracing::info!("halting session: abort_on_verify_failure is set");
            summary.halted_early = true;
            break;
        }
    }
    summary.halted_early |= aborted;

    // Clean completion: the state file has served its purpose. The backup
    // branch stays for the operator to prune once satisfied.
    if !summary.halted_early {
        let _ = std::fs::remove_file(session_state_path(root));
    }
    Ok(summary)
}

/// Roll back a crashed in-flight transaction recorded in the session state
/// file, returning the cleaned state when one existed.
fn rollback_in_flight(root: &Path, audit: &mut AuditLog) -> Result<Option<SessionState>> {
    let mut previous = match read_session_state(root) {
        Some(state) => state,
        None => return Ok(None),
    };
    if let Some(in_flight) = previous.in_flight.take() {
        tracing::warn!(
            finding_id = %in_flight.finding_id,
            "rolling back in-flight transaction from interrupted session"
        );
        git::reset_hard(root, &in_flight.pre_sha)?;
        audit.append(
            &TransactionRecord::new(&in_flight.finding_id, TxState::RolledBack, Utc::now())
                .with_pre_hash(&in_flight.pre_sha)
                .with_detail("recovered after interrupted session"),
        )?;
        write_session_state(root, &previous)?;
    }
    Ok(Some(previous))
}

/// Either resume the recovered session or start a new one with a fresh
/// backup branch.
fn recover_or_start(
    root: &Path,
    config: &AuditConfig,
    audit: &mut AuditLog,
    options: &ExecutorOptions,
    prior: Option<SessionState>,
) -> Result<SessionState> {
    if let Some(previous) = prior {
        if options.resume {
            return Ok(previous);
        }
        let _ = std::fs::remove_file(session_state_path(root));
    } else if options.resume {
        return Err(AuditError::ReportError {
            message: "no session state to resume".to_string(),
        });
    }

    let backup_branch = config.backup_namespace_or_default();
    git::create_backup_branch(root, &backup_branch)?;
    audit.append(
        &TransactionRecord::new("", TxState::BackedUp, Utc::now())
            .with_detail(format!("session backup branch '{}' created", backup_branch)),
    )?;

    let state = SessionState {
        backup_branch,
        completed: Vec::new(),
        in_flight: None,
    };
    write_session_state(root, &state)?;
    Ok(state)
}

#[allow(clippy::too_many_arguments)]
fn run_transaction(
    root: &Path,
    config: &AuditConfig,
    finding: &Finding,
    verifier: &dyn Verifier,
    decision: &mut dyn DecisionCallback,
    checker: &ReferenceChecker,
    audit: &mut AuditLog,
    state: &mut SessionState,
    approved_tiers: &mut HashSet<crate::schema::RiskTier>,
    options: &ExecutorOptions,
) -> Result<TransactionOutcome> {
    let fid = finding.finding_id.as_str();
    let mut row = TransactionOutcome {
        finding_id: finding.finding_id.clone(),
        artifact_path: finding.artifact_path.clone(),
        action: finding.recommendation,
        outcome: TxOutcome::SkippedByOperator,
        verifier: None,
    };

    audit.append(&TransactionRecord::new(fid, TxState::Loaded, Utc::now()))?;

    // PRECHECK: the artifact must still be what the scan saw
    let current_hash = current_artifact_hash(root, config, finding);
    if current_hash.as_deref() != Some(finding.artifact_hash.as_str()) {
        audit.append(
            &TransactionRecord::new(fid, TxState::Stale, Utc::now())
                .with_detail("artifact changed since scan"),
        )?;
        tracing::info!(
            finding = fid,
            artifact = %finding.artifact_path,
            "skipped: artifact changed since scan"
        );
        row.outcome = TxOutcome::SkippedStale;
        return Ok(row);
    }
    audit.append(
        &TransactionRecord::new(fid, TxState::Prechecked, Utc::now())
            .with_pre_hash(&finding.artifact_hash),
    )?;

    // Approval gate
    let decision_label = match approval(config, finding, decision, approved_tiers) {
        ApprovalOutcome::Approved(label) => label,
        ApprovalOutcome::Skipped => {
            audit.append(
                &TransactionRecord::new(fid, TxState::Skipped, Utc::now())
                    .with_decision("skip"),
            )?;
            row.outcome = TxOutcome::SkippedByOperator;
            return Ok(row);
        }
        ApprovalOutcome::Aborted => {
            audit.append(
                &TransactionRecord::new(fid, TxState::Aborted, Utc::now())
                    .with_decision("abort"),
            )?;
            row.outcome = TxOutcome::Aborted;
            return Ok(row);
        }
    };

    if options.dry_run {
        audit.append(
            &TransactionRecord::new(fid, TxState::Skipped, Utc::now())
                .with_decision(&decision_label)
                .with_detail("dry run"),
        )?;
        row.outcome = TxOutcome::DryRun;
        return Ok(row);
    }

    // BACKED_UP: pin the pre-state and make the transaction recoverable
    let pre_sha = git::head_sha(root).ok_or_else(|| AuditError::BackupFailed {
        message: "repository has no HEAD".to_string(),
    })?;
    state.in_flight = Some(InFlight {
        finding_id: finding.finding_id.clone(),
        pre_sha: pre_sha.clone(),
    });
    write_session_state(root, state)?;
    audit.append(
        &TransactionRecord::new(fid, TxState::BackedUp, Utc::now())
            .with_decision(&decision_label)
            .with_pre_hash(&pre_sha),
    )?;

    // APPLIED
    let applied = match apply_action(root, finding, checker) {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(finding = fid, error = %e, "action failed; rolling back");
            git::reset_hard(root, &pre_sha)?;
            clear_in_flight(root, state)?;
            audit.append(
                &TransactionRecord::new(fid, TxState::RolledBack, Utc::now())
                    .with_pre_hash(&pre_sha)
                    .with_detail(format!("action failed: {}", e)),
            )?;
            row.outcome = TxOutcome::RolledBack;
            return Ok(row);
        }
    };

    match applied {
        ActionOutcome::ManualActionRequired { reason } => {
            clear_in_flight(root, state)?;
            audit.append(
                &TransactionRecord::new(fid, TxState::RequiresManual, Utc::now())
                    .with_detail(reason),
            )?;
            row.outcome = TxOutcome::RequiresManual;
            Ok(row)
        }
        ActionOutcome::Blocked { reason } => {
            clear_in_flight(root, state)?;
            audit.append(
                &TransactionRecord::new(fid, TxState::RequiresManual, Utc::now())
                    .with_detail(format!("blocked, downgraded to manual refactor: {}", reason)),
            )?;
            row.outcome = TxOutcome::RequiresManual;
            Ok(row)
        }
        ActionOutcome::Mutated { description } => {
            audit.append(
                &TransactionRecord::new(fid, TxState::Applied, Utc::now())
                    .with_pre_hash(&pre_sha)
                    .with_detail(description.clone()),
            )?;

            // VERIFIED: timeout counts as failure
            let verdict = verifier.verify(root);
            audit.append(
                &TransactionRecord::new(fid, TxState::Verified, Utc::now())
                    .with_verifier(verdict.as_str()),
            )?;
            row.verifier = Some(verdict);

            if verdict.is_pass() {
                let message = format!("debloat: {}", description);
                let post_sha = git::commit_all(root, &message)?;
                state.completed.push(finding.finding_id.clone());
                clear_in_flight(root, state)?;
                audit.append(
                    &TransactionRecord::new(fid, TxState::Committed, Utc::now())
                        .with_pre_hash(&pre_sha)
                        .with_post_hash(&post_sha)
                        .with_verifier(verdict.as_str()),
                )?;
                row.outcome = TxOutcome::Applied;
            } else {
                git::reset_hard(root, &pre_sha)?;
                clear_in_flight(root, state)?;
                audit.append(
                    &TransactionRecord::new(fid, TxState::RolledBack, Utc::now())
                        .with_pre_hash(&pre_sha)
                        .with_verifier(verdict.as_str())
                        .with_detail("reverted: verification failed"),
                )?;
                row.outcome = TxOutcome::RolledBack;
            }
            Ok(row)
        }
    }
}

fn clear_in_flight(root: &Path, state: &mut SessionState) -> Result<()> {
    state.in_flight = None;
    write_session_state(root, state)
}

enum ApprovalOutcome {
    Approved(String),
    Skipped,
    Aborted,
}

fn approval(
    config: &AuditConfig,
    finding: &Finding,
    decision: &mut dyn DecisionCallback,
    approved_tiers: &mut HashSet<crate::schema::RiskTier>,
) -> ApprovalOutcome {
    if let Some(policy) = &config.auto_approve {
        if finding.risk_tier <= policy.max_risk_tier && finding.confidence >= policy.min_confidence
        {
            return ApprovalOutcome::Approved("auto_approved".to_string());
        }
    }
    if approved_tiers.contains(&finding.risk_tier) {
        return ApprovalOutcome::Approved("approve_all_of_tier".to_string());
    }

    loop {
        match decision.request_decision(finding) {
            Decision::Approve => {
                return ApprovalOutcome::Approved("approve".to_string());
            }
            Decision::ApproveAllOfTier => {
                approved_tiers.insert(finding.risk_tier);
                return ApprovalOutcome::Approved("approve_all_of_tier".to_string());
            }
            Decision::InspectDiff => {
                // The host displays the preview and asks again
                tracing::debug!(finding = %finding.finding_id, "inspect requested");
                continue;
            }
            Decision::Skip => return ApprovalOutcome::Skipped,
            Decision::Abort => return ApprovalOutcome::Aborted,
        }
    }
}

/// Recompute the stable content hash an artifact has right now
fn current_artifact_hash(root: &Path, config: &AuditConfig, finding: &Finding) -> Option<String> {
    match finding.artifact_kind {
        ArtifactKind::Dependency => {
            let (manifest, name) = finding.artifact_path.split_once('#')?;
            let mut probe_config = config.clone();
            probe_config.root = root.to_path_buf();
            let deps = declared_dependencies(&probe_config).ok()?;
            let dep = deps
                .iter()
                .find(|d| d.manifest == manifest && d.name == name)?;
            Some(format!(
                "{:016x}",
                fnv1a_hash(&format!("{} {}", dep.name, dep.version))
            ))
        }
        _ => {
            let source = std::fs::read_to_string(root.join(&finding.artifact_path)).ok()?;
            Some(stable_content_hash(&source, &finding.artifact_path))
        }
    }
}
