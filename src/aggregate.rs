//! Finding aggregation
//!
//! Translates fused per-artifact evidence into actionable findings. The
//! decision table maps dominant signals onto a recommendation and a risk
//! tier; the core-path policy then caps anything the operator declared
//! protected, and a final gate guarantees a DELETE is never issued without a
//! high-confidence item plus an orthogonal corroborating source.

use std::collections::{BTreeMap, HashSet};

use crate::collectors::ScanContext;
use crate::error::Result;
use crate::fusion::{fuse, sort_findings, FusedScore};
use crate::schema::{
    compute_finding_id, Artifact, ConfidenceBand, Evidence, EvidenceSource, Finding,
    ObservedValue, Recommendation, RiskTier, Severity, SignalKind,
};

/// Aggregate an evidence stream into ranked findings.
pub fn aggregate(
    ctx: &ScanContext,
    artifacts: &[Artifact],
    evidence: Vec<Evidence>,
) -> Result<Vec<Finding>> {
    // BTreeMap so group membership and evidence ordering never depend on
    // hash-map iteration order.
    let by_artifact: BTreeMap<String, Vec<Evidence>> =
        crate::fusion::accumulate(evidence).into_iter().collect();
    let artifact_index: BTreeMap<String, &Artifact> =
        artifacts.iter().map(|a| (a.id(), a)).collect();
    let core_globs = ctx.config.core_globs()?;

    // Similarity-group evidence aggregates into group findings; everything
    // else stays with its artifact.
    let mut group_members: BTreeMap<String, Vec<(String, Evidence)>> = BTreeMap::new();
    let mut per_artifact: BTreeMap<String, Vec<Evidence>> = BTreeMap::new();

    for (artifact_id, items) in by_artifact {
        for item in items {
            match (&item.signal_kind, &item.observed_value) {
                (SignalKind::NearDuplicate, Some(ObservedValue::Group(group_id))) => {
                    group_members
                        .entry(group_id.clone())
                        .or_default()
                        .push((artifact_id.clone(), item));
                }
                _ => {
                    per_artifact
                        .entry(artifact_id.clone())
                        .or_default()
                        .push(item);
                }
            }
        }
    }

    let mut findings = Vec::new();

    for (group_id, members) in group_members {
        if members.len() < 2 {
            // A group needs at least two surviving members; orphaned group
            // evidence degrades to ordinary per-artifact evidence.
            for (artifact_id, item) in members {
                per_artifact.entry(artifact_id).or_default().push(item);
            }
            continue;
        }
        if let Some(finding) =
            build_group_finding(ctx, &artifact_index, &core_globs, &group_id, members)
        {
            findings.push(finding);
        }
    }

    for (artifact_id, items) in per_artifact {
        let artifact = match artifact_index.get(&artifact_id) {
            Some(a) => a,
            None => continue,
        };
        if items.is_empty() {
            continue;
        }
        findings.push(build_artifact_finding(ctx, artifact, &core_globs, items));
    }

    sort_findings(&mut findings);
    Ok(findings)
}

// ============================================================================
// Group findings
// ============================================================================

fn build_group_finding(
    ctx: &ScanContext,
    artifact_index: &BTreeMap<String, &Artifact>,
    core_globs: &globset::GlobSet,
    group_id: &str,
    members: Vec<(String, Evidence)>,
) -> Option<Finding> {
    let member_artifacts: Vec<&Artifact> = members
        .iter()
        .filter_map(|(id, _)| artifact_index.get(id).copied())
        .collect();
    if member_artifacts.len() < 2 {
        return None;
    }

    // Canonical member: most recently modified. Commit history is the
    // recency source when available (filesystem mtimes tie after clones);
    // ties break toward the lexicographically smaller path.
    let canonical = member_artifacts
        .iter()
        .max_by(|a, b| {
            recency_epoch(ctx, a)
                .cmp(&recency_epoch(ctx, b))
                .then_with(|| b.path.cmp(&a.path))
        })
        .copied()?;

    let evidence: Vec<Evidence> = members.into_iter().map(|(_, e)| e).collect();
    let fused = fuse(&evidence);
    let similarity = evidence
        .iter()
        .map(|e| e.weight)
        .fold(0.0f64, |acc, w| acc.max(w));

    let mut affected: Vec<String> = member_artifacts.iter().map(|a| a.id()).collect();
    affected.sort();

    let mut recommendation = Recommendation::Consolidate;
    let mut risk_tier = RiskTier::Medium;
    if core_globs.is_match(&canonical.path) {
        apply_core_policy(&mut recommendation, &mut risk_tier);
    }

    // Consolidating keeps the canonical copy; the duplicates are the savings
    let estimated_token_impact: u64 = member_artifacts
        .iter()
        .filter(|a| a.path != canonical.path)
        .map(|a| a.byte_size / 4)
        .sum();

    let rationale = format!(
        "near-duplicate group of {} artifacts (similarity {:.2}); canonical: {}",
        member_artifacts.len(),
        similarity,
        canonical.path
    );

    Some(Finding {
        finding_id: compute_finding_id(&affected),
        artifact_path: canonical.path.clone(),
        artifact_kind: canonical.kind,
        artifact_hash: canonical.content_hash.clone(),
        bloat_score: fused.bloat_score,
        confidence: fused.confidence,
        severity: fused.severity,
        risk_tier,
        recommendation,
        estimated_token_impact,
        affected_artifacts: affected,
        rationale: format!("{} [{}]", rationale, group_id),
        fix_patch: None,
        evidence,
    })
}

// ============================================================================
// Per-artifact findings
// ============================================================================

fn build_artifact_finding(
    ctx: &ScanContext,
    artifact: &Artifact,
    core_globs: &globset::GlobSet,
    evidence: Vec<Evidence>,
) -> Finding {
    let fused = fuse(&evidence);
    let (mut recommendation, mut risk_tier) = base_decision(ctx, artifact, &evidence, &fused);

    if core_globs.is_match(&artifact.path) {
        apply_core_policy(&mut recommendation, &mut risk_tier);
    }

    // DELETE is only defensible with a high-confidence item corroborated by
    // a second, orthogonal source.
    if recommendation == Recommendation::Delete {
        let has_high_confidence = evidence.iter().any(|e| e.confidence >= 0.8);
        if !has_high_confidence || fused.distinct_sources < 2 {
            recommendation = Recommendation::Archive;
            risk_tier = RiskTier::Low;
        }
    }

    let affected = vec![artifact.id()];

    Finding {
        finding_id: compute_finding_id(&affected),
        artifact_path: artifact.path.clone(),
        artifact_kind: artifact.kind,
        artifact_hash: artifact.content_hash.clone(),
        bloat_score: fused.bloat_score,
        confidence: fused.confidence,
        severity: fused.severity,
        risk_tier,
        recommendation,
        estimated_token_impact: token_impact(artifact, &evidence),
        affected_artifacts: affected,
        rationale: build_rationale(&evidence, &fused),
        fix_patch: None,
        evidence,
    }
}

/// Decision table over dominant signals. First matching row wins.
fn base_decision(
    ctx: &ScanContext,
    artifact: &Artifact,
    evidence: &[Evidence],
    fused: &FusedScore,
) -> (Recommendation, RiskTier) {
    let kinds: HashSet<SignalKind> = evidence.iter().map(|e| e.signal_kind).collect();
    let sources: HashSet<EvidenceSource> = evidence.iter().map(|e| e.source).collect();

    // Dead artifact: unreferenced, stale, corroborated by both history and
    // static analysis, scored and trusted highly.
    if kinds.contains(&SignalKind::ZeroReferences)
        && kinds.contains(&SignalKind::Stale)
        && sources.contains(&EvidenceSource::GitHistory)
        && sources.contains(&EvidenceSource::StaticAnalysis)
        && fused.severity == Severity::High
        && fused.confidence_band == ConfidenceBand::High
    {
        return (Recommendation::Delete, RiskTier::Low);
    }

    // Unused dependency with a high-confidence detection
    if evidence
        .iter()
        .any(|e| e.signal_kind == SignalKind::UnusedDependency && e.confidence >= 0.8)
    {
        return (Recommendation::Delete, RiskTier::Low);
    }

    // Oversized or tangled structure still under active churn
    let structural = kinds.contains(&SignalKind::LargeFunction)
        || kinds.contains(&SignalKind::GodStructure)
        || kinds.contains(&SignalKind::CyclomaticComplexityHigh);
    if structural && fused.severity == Severity::High && has_recent_churn(ctx, artifact) {
        return (Recommendation::Refactor, RiskTier::Medium);
    }

    // High score we cannot trust yet: park it reversibly
    if fused.severity == Severity::High && fused.confidence_band == ConfidenceBand::Low {
        return (Recommendation::Archive, RiskTier::Low);
    }

    (Recommendation::Keep, RiskTier::Low)
}

/// Epoch seconds of the artifact's last change, preferring git history
fn recency_epoch(ctx: &ScanContext, artifact: &Artifact) -> i64 {
    if let Some(stats) = ctx
        .git_stats
        .as_ref()
        .and_then(|stats| stats.get(&artifact.path))
    {
        return stats.last_commit_epoch;
    }
    artifact
        .last_modified
        .as_deref()
        .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.timestamp())
        .unwrap_or(0)
}

fn has_recent_churn(ctx: &ScanContext, artifact: &Artifact) -> bool {
    ctx.git_stats
        .as_ref()
        .and_then(|stats| stats.get(&artifact.path))
        .map(|s| s.commits_in_window > 0)
        .unwrap_or(false)
}

/// Core-path policy: cap at REFACTOR (never DELETE), raise the risk tier.
fn apply_core_policy(recommendation: &mut Recommendation, risk_tier: &mut RiskTier) {
    while recommendation.destructiveness() > Recommendation::Refactor.destructiveness() {
        *recommendation = recommendation.downgraded();
    }
    *risk_tier = risk_tier.raised();
}

/// Default token impact is a quarter of the byte size; adapters may supply a
/// richer estimate through their observed values.
fn token_impact(artifact: &Artifact, evidence: &[Evidence]) -> u64 {
    let adapter_estimate = evidence
        .iter()
        .filter_map(|e| match e.observed_value {
            Some(ObservedValue::Tokens(t)) => Some(t),
            _ => None,
        })
        .max();
    adapter_estimate.unwrap_or(artifact.byte_size / 4)
}

fn build_rationale(evidence: &[Evidence], fused: &FusedScore) -> String {
    let mut signals: Vec<String> = evidence
        .iter()
        .map(|e| format!("{} ({})", e.signal_kind.as_str(), e.source.as_str()))
        .collect();
    signals.sort();
    signals.dedup();
    format!(
        "{}; {} corroborating source{}",
        signals.join(", "),
        fused.distinct_sources,
        if fused.distinct_sources == 1 { "" } else { "s" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditConfig;
    use crate::git::FileGitStats;
    use crate::schema::ArtifactKind;
    use std::collections::HashMap;

    fn artifact(path: &str, kind: ArtifactKind, bytes: u64) -> Artifact {
        Artifact {
            path: path.to_string(),
            kind,
            byte_size: bytes,
            line_count: (bytes / 40) as usize,
            content_hash: format!("hash-{}", path),
            last_modified: Some("2026-01-01T00:00:00Z".to_string()),
            inbound_refs: None,
        }
    }

    fn ev(artifact_id: &str, source: EvidenceSource, kind: SignalKind, w: f64, c: f64) -> Evidence {
        Evidence::new(artifact_id, source, kind, w, c, "test-1")
    }

    fn ctx() -> ScanContext {
        ScanContext::new(AuditConfig::default())
    }

    #[test]
    fn test_dead_file_delete_low_risk() {
        let ctx = ctx();
        let artifacts = vec![artifact("src/old_api.py", ArtifactKind::File, 12_800)];
        let id = "file:src/old_api.py";
        let evidence = vec![
            ev(id, EvidenceSource::GitHistory, SignalKind::Stale, 0.9, 0.85),
            ev(id, EvidenceSource::StaticAnalysis, SignalKind::UnusedSymbol, 0.8, 1.0),
            ev(id, EvidenceSource::StaticAnalysis, SignalKind::ZeroReferences, 0.85, 0.9),
            ev(id, EvidenceSource::Heuristic, SignalKind::Oversized, 0.4, 0.9),
        ];

        let findings = aggregate(&ctx, &artifacts, evidence).unwrap();
        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.recommendation, Recommendation::Delete);
        assert_eq!(finding.risk_tier, RiskTier::Low);
        assert!(finding.bloat_score >= 90);
        assert!(finding.confidence >= 0.85);
        assert!(finding.distinct_sources() >= 3);
        assert_eq!(finding.estimated_token_impact, 3200);
    }

    #[test]
    fn test_core_path_never_delete() {
        let mut config = AuditConfig::default();
        config.core_paths = vec!["src/auth/**".into()];
        let mut scan_ctx = ScanContext::new(config);
        let mut stats = HashMap::new();
        stats.insert(
            "src/auth/session.py".to_string(),
            FileGitStats {
                commits_in_window: 4,
                ..Default::default()
            },
        );
        scan_ctx.git_stats = Some(stats);

        let artifacts = vec![artifact("src/auth/session.py", ArtifactKind::File, 25_000)];
        let id = "file:src/auth/session.py";
        // Strong enough to reach DELETE absent the core-path policy
        let evidence = vec![
            ev(id, EvidenceSource::GitHistory, SignalKind::Stale, 0.9, 0.9),
            ev(id, EvidenceSource::StaticAnalysis, SignalKind::ZeroReferences, 0.9, 0.9),
            ev(id, EvidenceSource::Heuristic, SignalKind::GodStructure, 0.8, 0.8),
        ];

        let findings = aggregate(&scan_ctx, &artifacts, evidence).unwrap();
        let finding = &findings[0];
        assert_ne!(finding.recommendation, Recommendation::Delete);
        assert_eq!(finding.recommendation, Recommendation::Refactor);
        assert!(finding.risk_tier >= RiskTier::Medium);
    }

    #[test]
    fn test_core_path_refactor_stays_refactor() {
        let mut config = AuditConfig::default();
        config.core_paths = vec!["src/auth/**".into()];
        let mut scan_ctx = ScanContext::new(config);
        let mut stats = HashMap::new();
        stats.insert(
            "src/auth/session.py".to_string(),
            FileGitStats {
                commits_in_window: 2,
                ..Default::default()
            },
        );
        scan_ctx.git_stats = Some(stats);

        let artifacts = vec![artifact("src/auth/session.py", ArtifactKind::File, 25_000)];
        let id = "file:src/auth/session.py";
        let evidence = vec![
            ev(id, EvidenceSource::Heuristic, SignalKind::GodStructure, 0.9, 0.9),
            ev(id, EvidenceSource::StaticAnalysis, SignalKind::CyclomaticComplexityHigh, 0.9, 0.9),
            ev(id, EvidenceSource::Heuristic, SignalKind::Oversized, 0.8, 0.9),
            ev(id, EvidenceSource::GitHistory, SignalKind::Stale, 0.5, 0.85),
        ];

        let findings = aggregate(&scan_ctx, &artifacts, evidence).unwrap();
        let finding = &findings[0];
        assert_eq!(finding.recommendation, Recommendation::Refactor);
        assert_eq!(finding.risk_tier, RiskTier::High);
    }

    #[test]
    fn test_near_duplicate_group_consolidate() {
        let ctx = ctx();
        let mut newer = artifact("docs/setup.md", ArtifactKind::Doc, 16_800);
        newer.last_modified = Some("2026-05-01T00:00:00Z".to_string());
        let mut older = artifact("docs/archive/old-setup-guide.md", ArtifactKind::Doc, 15_800);
        older.last_modified = Some("2025-03-01T00:00:00Z".to_string());
        let artifacts = vec![newer, older];

        let group = ObservedValue::Group("grp-abc123".to_string());
        let evidence = vec![
            ev("doc:docs/setup.md", EvidenceSource::Similarity, SignalKind::NearDuplicate, 0.91, 0.85)
                .with_observed(group.clone()),
            ev(
                "doc:docs/archive/old-setup-guide.md",
                EvidenceSource::Similarity,
                SignalKind::NearDuplicate,
                0.91,
                0.85,
            )
            .with_observed(group),
        ];

        let findings = aggregate(&ctx, &artifacts, evidence).unwrap();
        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.recommendation, Recommendation::Consolidate);
        assert_eq!(finding.risk_tier, RiskTier::Medium);
        // Canonical is the most recently modified member
        assert_eq!(finding.artifact_path, "docs/setup.md");
        assert_eq!(finding.affected_artifacts.len(), 2);
        // Savings come from the non-canonical copy
        assert_eq!(finding.estimated_token_impact, 15_800 / 4);
    }

    #[test]
    fn test_unused_dependency_delete() {
        let ctx = ctx();
        let artifacts = vec![artifact(
            "requirements.txt#leftpad",
            ArtifactKind::Dependency,
            16,
        )];
        let id = "dependency:requirements.txt#leftpad";
        let evidence = vec![
            ev(id, EvidenceSource::Dependency, SignalKind::UnusedDependency, 0.9, 0.9),
            ev(id, EvidenceSource::StaticAnalysis, SignalKind::ZeroReferences, 0.8, 0.9),
        ];

        let findings = aggregate(&ctx, &artifacts, evidence).unwrap();
        let finding = &findings[0];
        assert_eq!(finding.recommendation, Recommendation::Delete);
        assert_eq!(finding.risk_tier, RiskTier::Low);
        assert!(finding.distinct_sources() >= 2);
    }

    #[test]
    fn test_delete_gate_downgrades_single_source() {
        let ctx = ctx();
        let artifacts = vec![artifact("pkg#lonely", ArtifactKind::Dependency, 16)];
        let id = "dependency:pkg#lonely";
        // High-confidence unused claim but no second source
        let evidence = vec![ev(
            id,
            EvidenceSource::Dependency,
            SignalKind::UnusedDependency,
            0.9,
            0.9,
        )];

        let findings = aggregate(&ctx, &artifacts, evidence).unwrap();
        assert_ne!(findings[0].recommendation, Recommendation::Delete);
    }

    #[test]
    fn test_high_severity_low_confidence_archives() {
        let ctx = ctx();
        let artifacts = vec![artifact("src/maybe.rs", ArtifactKind::File, 4_000)];
        let id = "file:src/maybe.rs";
        // Strong weights across two sources, but weak detector confidence
        let evidence = vec![
            ev(id, EvidenceSource::Heuristic, SignalKind::Oversized, 1.0, 0.7),
            ev(id, EvidenceSource::Heuristic, SignalKind::MagicLiteral, 1.0, 0.7),
            ev(id, EvidenceSource::Similarity, SignalKind::DuplicatedBlock, 1.0, 0.7),
            ev(id, EvidenceSource::Similarity, SignalKind::TightCoupling, 1.0, 0.7),
        ];

        let findings = aggregate(&ctx, &artifacts, evidence).unwrap();
        let finding = &findings[0];
        assert_eq!(finding.severity, Severity::High);
        // Two-of-three corroboration with weak detectors stays in the LOW band
        assert!(finding.confidence < 0.6);
        assert_eq!(finding.recommendation, Recommendation::Archive);
    }

    #[test]
    fn test_keep_fallback() {
        let ctx = ctx();
        let artifacts = vec![artifact("src/fine.rs", ArtifactKind::File, 2_000)];
        let evidence = vec![ev(
            "file:src/fine.rs",
            EvidenceSource::Heuristic,
            SignalKind::MagicLiteral,
            0.3,
            0.6,
        )];

        let findings = aggregate(&ctx, &artifacts, evidence).unwrap();
        assert_eq!(findings[0].recommendation, Recommendation::Keep);
    }

    #[test]
    fn test_rationale_names_signals_and_sources() {
        let ctx = ctx();
        let artifacts = vec![artifact("src/a.rs", ArtifactKind::File, 2_000)];
        let evidence = vec![
            ev("file:src/a.rs", EvidenceSource::GitHistory, SignalKind::Stale, 0.8, 0.85),
            ev("file:src/a.rs", EvidenceSource::Heuristic, SignalKind::Oversized, 0.5, 0.9),
        ];

        let findings = aggregate(&ctx, &artifacts, evidence).unwrap();
        let rationale = &findings[0].rationale;
        assert!(rationale.contains("stale (git_history)"));
        assert!(rationale.contains("oversized (heuristic)"));
        assert!(rationale.contains("2 corroborating sources"));
    }
}
