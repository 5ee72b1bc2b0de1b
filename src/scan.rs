//! Scan orchestration
//!
//! Wires the pipeline together: artifact collection, the concurrent
//! collector fan-out, evidence fusion, aggregation and the final report.
//! Adapter presence is resolved once at session start and carried as an
//! immutable snapshot; a scan requested at tier 2+ with no adapter present
//! is demoted to tier 1 rather than failed.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::SecondsFormat;
use uuid::Uuid;

use crate::adapters::{builtin_adapters, discover, DiscoveredAdapter};
use crate::aggregate::aggregate;
use crate::artifacts::collect_artifacts;
use crate::collectors::{
    default_collectors, run_collectors, Collector, ScanContext, StaticAnalysisCollector,
};
use crate::config::AuditConfig;
use crate::error::Result;
use crate::git;
use crate::report::ReportStore;
use crate::schema::{ScanReport, ToolStatus, SCHEMA_VERSION};

/// Result of a stored scan
#[derive(Debug)]
pub struct ScanOutcome {
    pub report: ScanReport,
    pub report_path: PathBuf,
    pub digest: String,
}

/// Build the session context: clock, cancellation flag and git statistics.
pub fn build_context(config: AuditConfig, cancel: Arc<AtomicBool>) -> Result<ScanContext> {
    let mut ctx = ScanContext::new(config);
    ctx.cancel = cancel;

    if git::is_git_repo(ctx.root()) {
        let stats = git::collect_file_stats(
            ctx.root(),
            ctx.config.thresholds.churn_window_days,
            ctx.now,
        )?;
        ctx.git_stats = Some(stats);
        ctx.record_tool(
            "git",
            ToolStatus {
                available: true,
                version: None,
                partial: false,
                reason: None,
            },
        );
    } else {
        ctx.record_tool(
            "git",
            ToolStatus {
                available: false,
                version: None,
                partial: false,
                reason: Some("not a git repository".to_string()),
            },
        );
    }

    Ok(ctx)
}

/// Run a scan against a prepared context and adapter snapshot.
pub fn run_scan_with(
    mut ctx: ScanContext,
    discovered: Vec<DiscoveredAdapter>,
) -> Result<ScanReport> {
    configure_worker_pool(&ctx.config);

    // Record the frozen availability snapshot before anything runs
    for adapter in &discovered {
        ctx.record_tool(
            &adapter.info.name,
            ToolStatus {
                available: adapter.available,
                version: adapter.info.version.clone(),
                partial: false,
                reason: (!adapter.available).then(|| "executable not found".to_string()),
            },
        );
    }

    let static_collector = StaticAnalysisCollector::new(discovered);
    let requested_tier = ctx.config.tier;
    let tier = if requested_tier >= 2 && !static_collector.any_available() {
        tracing::warn!("no static-analysis adapter available; demoting scan to tier 1");
        1
    } else {
        requested_tier
    };
    ctx.config.tier = tier;

    let mut artifacts = collect_artifacts(&ctx.config)?;
    ctx.check_cancelled()?;
    if ctx
        .config
        .has_focus(crate::schema::FocusArea::Dependencies)
    {
        artifacts.extend(crate::collectors::dependency::dependency_artifacts(
            &ctx.config,
        )?);
    }
    artifacts.sort_by(|a, b| a.id().cmp(&b.id()));
    tracing::info!(artifacts = artifacts.len(), tier, "scan starting");

    let mut collectors: Vec<Box<dyn Collector>> = default_collectors();
    collectors.push(Box::new(static_collector));

    let evidence = run_collectors(&ctx, &artifacts, &collectors)?;
    tracing::info!(evidence = evidence.len(), "collectors finished");

    let findings = aggregate(&ctx, &artifacts, evidence)?;
    ctx.check_cancelled()?;

    Ok(ScanReport {
        schema_version: SCHEMA_VERSION,
        scan_id: Uuid::new_v4().to_string(),
        scan_timestamp: ctx.now.to_rfc3339_opts(SecondsFormat::Secs, true),
        root_commit: git::head_sha(ctx.root()),
        tier,
        focus: ctx.config.focus.clone(),
        tool_availability: ctx.tool_availability.lock().clone(),
        configuration_digest: ctx.config.digest(),
        findings,
    })
}

/// Full scan with the built-in adapter set
pub fn run_scan(config: AuditConfig, cancel: Arc<AtomicBool>) -> Result<ScanReport> {
    let ctx = build_context(config, cancel)?;
    let discovered = discover(builtin_adapters());
    run_scan_with(ctx, discovered)
}

/// Scan and persist the report. A cancelled scan stores nothing.
pub fn run_scan_and_store(config: AuditConfig, cancel: Arc<AtomicBool>) -> Result<ScanOutcome> {
    let store = ReportStore::new(&config.root);
    let report = run_scan(config, cancel)?;
    let (report_path, digest) = store.write(&report)?;
    Ok(ScanOutcome {
        report,
        report_path,
        digest,
    })
}

fn configure_worker_pool(config: &AuditConfig) {
    // The global pool can only be sized once per process; later scans reuse it
    let _ = rayon::ThreadPoolBuilder::new()
        .num_threads(config.effective_concurrency())
        .build_global();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn scan_dir(dir: &Path) -> ScanReport {
        let mut config = AuditConfig::default();
        config.root = dir.to_path_buf();
        let ctx = build_context(config, Arc::new(AtomicBool::new(false))).unwrap();
        run_scan_with(ctx, Vec::new()).unwrap()
    }

    #[test]
    fn test_tier_demoted_without_adapters() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.rs"), "fn main() {}\n").unwrap();
        let report = scan_dir(dir.path());
        assert_eq!(report.tier, 1);
        assert_eq!(report.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_no_vcs_recorded_in_availability() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.rs"), "fn main() {}\n").unwrap();
        let report = scan_dir(dir.path());
        let git_status = report.tool_availability.get("git").unwrap();
        assert!(!git_status.available);
        assert!(report.root_commit.is_none());
    }

    #[test]
    fn test_cancelled_scan_produces_no_report() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.rs"), "fn main() {}\n").unwrap();
        let mut config = AuditConfig::default();
        config.root = dir.path().to_path_buf();
        let cancel = Arc::new(AtomicBool::new(true));
        let ctx = build_context(config, cancel).unwrap();
        assert!(run_scan_with(ctx, Vec::new()).is_err());
    }
}
