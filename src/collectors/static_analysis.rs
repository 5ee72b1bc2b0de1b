//! Static analysis collector (tier 2)
//!
//! Bridges the tool adapter layer into the evidence stream. Adapters run in
//! parallel with cached results; each adapter's availability and partiality
//! is recorded into the session's tool availability snapshot.
//!
//! Sanity filter: an adapter's claim that something is unused must survive a
//! repository-wide textual reference check before it may carry HIGH
//! confidence. A symbol that still appears elsewhere in the tree has its
//! confidence capped below the HIGH band.

use std::sync::mpsc;

use rayon::prelude::*;

use super::{Collector, ScanContext};
use crate::adapters::{cache_key, cache_lookup, cache_store, AdapterOutcome, DiscoveredAdapter};
use crate::config::AuditConfig;
use crate::error::Result;
use crate::refcheck::ReferenceChecker;
use crate::schema::{
    Artifact, Evidence, EvidenceSource, FocusArea, ObservedValue, SignalKind, ToolStatus,
};

/// Confidence cap applied to unused-ness claims contradicted by a textual match
const CONTRADICTED_CONFIDENCE_CAP: f64 = 0.75;

/// Tier-2 collector over the discovered adapter set
pub struct StaticAnalysisCollector {
    discovered: Vec<DiscoveredAdapter>,
}

impl StaticAnalysisCollector {
    pub fn new(discovered: Vec<DiscoveredAdapter>) -> Self {
        Self { discovered }
    }

    /// Whether any adapter is actually present (drives tier demotion)
    pub fn any_available(&self) -> bool {
        self.discovered.iter().any(|d| d.available)
    }
}

impl Collector for StaticAnalysisCollector {
    fn name(&self) -> &'static str {
        "static_analysis"
    }

    fn source(&self) -> EvidenceSource {
        EvidenceSource::StaticAnalysis
    }

    fn enabled(&self, config: &AuditConfig) -> bool {
        config.tier >= 2 && config.has_focus(FocusArea::Code)
    }

    fn collect(
        &self,
        ctx: &ScanContext,
        artifacts: &[Artifact],
        tx: &mpsc::Sender<Evidence>,
    ) -> Result<()> {
        // Unavailable adapters are recorded, never run
        for discovered in self.discovered.iter().filter(|d| !d.available) {
            ctx.record_tool(
                discovered.adapter.name(),
                ToolStatus {
                    available: false,
                    version: None,
                    partial: false,
                    reason: Some("executable not found".to_string()),
                },
            );
        }

        let outcomes: Vec<(usize, AdapterOutcome)> = self
            .discovered
            .par_iter()
            .enumerate()
            .filter(|(_, d)| d.available)
            .filter_map(|(idx, discovered)| {
                if ctx.cancelled() {
                    return None;
                }
                let outcome = run_adapter(ctx, discovered, artifacts);
                Some((idx, outcome))
            })
            .collect();
        ctx.check_cancelled()?;

        let checker = ReferenceChecker::new(ctx.root());
        let mut zero_ref_artifacts: Vec<String> = Vec::new();
        for (idx, outcome) in outcomes {
            let discovered = &self.discovered[idx];
            ctx.record_tool(
                discovered.adapter.name(),
                ToolStatus {
                    available: true,
                    version: discovered.info.version.clone(),
                    partial: outcome.partial,
                    reason: outcome
                        .partial
                        .then(|| "timed out; evidence may be incomplete".to_string()),
                },
            );

            for evidence in outcome.evidence {
                let detector = evidence.detector_version.clone();
                let (filtered, confirmed_zero) = sanity_filter(&checker, evidence);
                if confirmed_zero && !zero_ref_artifacts.contains(&filtered.artifact_id) {
                    zero_ref_artifacts.push(filtered.artifact_id.clone());
                    tx.send(
                        Evidence::new(
                            filtered.artifact_id.clone(),
                            EvidenceSource::StaticAnalysis,
                            SignalKind::ZeroReferences,
                            0.85,
                            0.9,
                            &detector,
                        )
                        .with_observed(ObservedValue::Count(0))
                        .with_partial(filtered.partial),
                    )
                    .ok();
                }
                tx.send(filtered).ok();
            }
        }
        Ok(())
    }
}

fn run_adapter(
    ctx: &ScanContext,
    discovered: &DiscoveredAdapter,
    artifacts: &[Artifact],
) -> AdapterOutcome {
    let adapter = discovered.adapter.as_ref();
    let key = cache_key(adapter, artifacts);
    let now_epoch = ctx.now.timestamp().max(0) as u64;

    if let Some(cached) = cache_lookup(adapter, &key, now_epoch) {
        tracing::debug!(adapter = adapter.name(), "cache hit");
        return cached;
    }

    match adapter.analyze(ctx, artifacts) {
        Ok(outcome) => {
            cache_store(adapter, &key, &outcome, now_epoch);
            outcome
        }
        Err(e) => {
            tracing::warn!(adapter = adapter.name(), error = %e, "adapter failed");
            AdapterOutcome::default()
        }
    }
}

/// Unused-ness claims that still have textual references lose their HIGH
/// confidence; everything else passes through unchanged. Returns whether the
/// check positively confirmed zero references, which itself corroborates the
/// claim as an orthogonal signal.
fn sanity_filter(checker: &ReferenceChecker, mut evidence: Evidence) -> (Evidence, bool) {
    let claims_unused = matches!(
        evidence.signal_kind,
        SignalKind::UnusedSymbol
            | SignalKind::UnusedImport
            | SignalKind::ZeroReferences
            | SignalKind::TreeShakeableDead
    );
    if !claims_unused || evidence.confidence < 0.8 {
        return (evidence, false);
    }

    let artifact_path = evidence
        .artifact_id
        .split_once(':')
        .map(|(_, p)| p.to_string())
        .unwrap_or_default();

    // Prefer the named symbol; fall back to the module stem for file-level
    // claims.
    let token = match &evidence.observed_value {
        Some(ObservedValue::Text(name)) => name.clone(),
        _ => module_stem(&artifact_path),
    };
    if token.is_empty() {
        return (evidence, false);
    }

    match checker.count_references(&token, Some(artifact_path.as_str())) {
        Ok(0) => (evidence, true),
        Err(_) => (evidence, false),
        Ok(_) => {
            evidence.confidence = evidence.confidence.min(CONTRADICTED_CONFIDENCE_CAP);
            (evidence, false)
        }
    }
}

fn module_stem(path: &str) -> String {
    path.rsplit('/')
        .next()
        .and_then(|f| f.split('.').next())
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{discover, AdapterOutcome, ToolAdapter};
    use crate::schema::ArtifactKind;
    use std::path::PathBuf;

    struct ScriptedAdapter {
        evidence: Vec<Evidence>,
    }

    impl ToolAdapter for ScriptedAdapter {
        fn name(&self) -> &'static str {
            "scripted"
        }
        fn adapter_version(&self) -> &'static str {
            "scripted-1"
        }
        fn executable(&self) -> &'static str {
            "scripted"
        }
        fn capabilities(&self) -> Vec<&'static str> {
            vec!["unused_symbol"]
        }
        fn is_available(&self) -> bool {
            true
        }
        fn probe_version(&self) -> Option<String> {
            Some("scripted 9.9".to_string())
        }
        fn analyze(&self, _ctx: &ScanContext, _artifacts: &[Artifact]) -> Result<AdapterOutcome> {
            Ok(AdapterOutcome {
                evidence: self.evidence.clone(),
                partial: false,
            })
        }
    }

    fn context_for(dir: &std::path::Path) -> ScanContext {
        let mut config = AuditConfig::default();
        config.root = PathBuf::from(dir);
        ScanContext::new(config)
    }

    #[test]
    fn test_sanity_filter_caps_contradicted_claims() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.py"), "def busy():\n    pass\n").unwrap();
        std::fs::write(dir.path().join("src/app.py"), "from lib import busy\nbusy()\n").unwrap();

        let checker = ReferenceChecker::new(dir.path());
        let claimed = Evidence::new(
            "file:src/lib.py",
            EvidenceSource::StaticAnalysis,
            SignalKind::UnusedSymbol,
            0.8,
            0.95,
            "scripted-1",
        )
        .with_observed(ObservedValue::Text("busy".to_string()));

        let (filtered, confirmed_zero) = sanity_filter(&checker, claimed);
        assert_eq!(filtered.confidence, CONTRADICTED_CONFIDENCE_CAP);
        assert!(!confirmed_zero);
    }

    #[test]
    fn test_sanity_filter_passes_genuinely_unused() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.py"), "def lonely():\n    pass\n").unwrap();

        let checker = ReferenceChecker::new(dir.path());
        let claimed = Evidence::new(
            "file:src/lib.py",
            EvidenceSource::StaticAnalysis,
            SignalKind::UnusedSymbol,
            0.8,
            0.95,
            "scripted-1",
        )
        .with_observed(ObservedValue::Text("lonely".to_string()));

        let (filtered, confirmed_zero) = sanity_filter(&checker, claimed);
        assert_eq!(filtered.confidence, 0.95);
        assert!(confirmed_zero);
    }

    #[test]
    fn test_availability_snapshot_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_for(dir.path());

        let discovered = discover(vec![Box::new(ScriptedAdapter { evidence: vec![] })]);
        let collector = StaticAnalysisCollector::new(discovered);
        assert!(collector.any_available());

        let (tx, rx) = mpsc::channel();
        collector.collect(&ctx, &[], &tx).unwrap();
        drop(tx);
        let _: Vec<Evidence> = rx.into_iter().collect();

        let availability = ctx.tool_availability.lock();
        let status = availability.get("scripted").expect("snapshot entry");
        assert!(status.available);
        assert_eq!(status.version.as_deref(), Some("scripted 9.9"));
        assert!(!status.partial);
    }

    #[test]
    fn test_module_stem() {
        assert_eq!(module_stem("src/old_api.py"), "old_api");
        assert_eq!(module_stem("lib.rs"), "lib");
    }

    #[allow(dead_code)]
    fn artifact(path: &str) -> Artifact {
        Artifact {
            path: path.to_string(),
            kind: ArtifactKind::File,
            byte_size: 10,
            line_count: 1,
            content_hash: "h".to_string(),
            last_modified: None,
            inbound_refs: None,
        }
    }
}
