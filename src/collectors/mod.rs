//! Signal collectors
//!
//! Each collector consumes the artifact stream and emits typed evidence over
//! a channel. Collectors run concurrently; the fusion stage is the single
//! consumer. A missing or failing collector never invalidates the others —
//! its absence is recorded and the scan continues.

pub mod dependency;
pub mod git_history;
pub mod heuristic;
pub mod similarity;
pub mod static_analysis;

pub use dependency::DependencyCollector;
pub use git_history::GitHistoryCollector;
pub use heuristic::HeuristicCollector;
pub use similarity::SimilarityCollector;
pub use static_analysis::StaticAnalysisCollector;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::config::AuditConfig;
use crate::error::{AuditError, Result};
use crate::git::FileGitStats;
use crate::schema::{Artifact, Evidence, EvidenceSource, ToolStatus};

/// Shared, read-only context for a scan session
pub struct ScanContext {
    /// Effective configuration
    pub config: AuditConfig,

    /// Wall clock pinned at session start (injectable for tests)
    pub now: DateTime<Utc>,

    /// Per-file git statistics; None when no VCS is present
    pub git_stats: Option<std::collections::HashMap<String, FileGitStats>>,

    /// Cooperative cancellation flag, checked at suspension points
    pub cancel: Arc<AtomicBool>,

    /// Tool availability snapshot, updated as adapters run
    pub tool_availability: Mutex<BTreeMap<String, ToolStatus>>,
}

impl ScanContext {
    pub fn new(config: AuditConfig) -> Self {
        Self {
            config,
            now: Utc::now(),
            git_stats: None,
            cancel: Arc::new(AtomicBool::new(false)),
            tool_availability: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Bail out of a suspension point when the scan was cancelled
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancelled() {
            Err(AuditError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Record a tool's availability in the session snapshot
    pub fn record_tool(&self, name: &str, status: ToolStatus) {
        self.tool_availability.lock().insert(name.to_string(), status);
    }
}

/// A producer of evidence over the artifact stream
pub trait Collector: Send + Sync {
    /// Stable collector name for logs and availability reporting
    fn name(&self) -> &'static str;

    /// Which evidence source this collector produces
    fn source(&self) -> EvidenceSource;

    /// Whether the configured focus enables this collector
    fn enabled(&self, config: &AuditConfig) -> bool;

    /// Emit evidence for the artifact stream. Evidence order is irrelevant;
    /// fusion is order-independent by construction.
    fn collect(
        &self,
        ctx: &ScanContext,
        artifacts: &[Artifact],
        tx: &mpsc::Sender<Evidence>,
    ) -> Result<()>;
}

/// Run collectors concurrently and drain their evidence into one vector.
///
/// Each collector owns a clone of the sender; the caller's thread is the
/// single consumer. Collector errors are logged and swallowed so one failing
/// signal source cannot sink the scan; cancellation is the exception.
pub fn run_collectors(
    ctx: &ScanContext,
    artifacts: &[Artifact],
    collectors: &[Box<dyn Collector>],
) -> Result<Vec<Evidence>> {
    let (tx, rx) = mpsc::channel::<Evidence>();

    let evidence = std::thread::scope(|scope| {
        for collector in collectors {
            if !collector.enabled(&ctx.config) {
                tracing::debug!(collector = collector.name(), "skipped by focus");
                continue;
            }
            let tx = tx.clone();
            scope.spawn(move || {
                if let Err(e) = collector.collect(ctx, artifacts, &tx) {
                    tracing::warn!(
                        collector = collector.name(),
                        error = %e,
                        "collector failed; continuing without its evidence"
                    );
                }
            });
        }
        drop(tx);

        let mut all = Vec::new();
        for item in rx {
            all.push(item);
        }
        all
    });

    ctx.check_cancelled()?;
    Ok(evidence)
}

/// The default collector set for a scan
pub fn default_collectors() -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(HeuristicCollector::new()),
        Box::new(GitHistoryCollector::new()),
        Box::new(SimilarityCollector::new()),
        Box::new(DependencyCollector::new()),
    ]
}
