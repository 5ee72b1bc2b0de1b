//! Evidence fusion and scoring
//!
//! Combines an artifact's evidence multiset into a bloat score and a fused
//! confidence:
//!
//! ```text
//! raw_signal    = 1 - prod(1 - w_i * c_i)          (noisy-OR)
//! corroboration = min(distinct_sources / 3, 1)
//! bloat_score   = round(100 * raw_signal * (0.5 + 0.5 * corroboration))
//! confidence    = mean(c_i) * corroboration * (1 - partiality_penalty)
//! ```
//!
//! Noisy-OR lets several weak signals accumulate without any one dominating;
//! corroboration rewards orthogonal sources over repetition from a single
//! one. Both formulas are commutative over the multiset, so evidence arrival
//! order never changes a report.

use ahash::AHashMap;
use ordered_float::OrderedFloat;

use crate::schema::{ConfidenceBand, Evidence, Finding, Severity};

/// Confidence penalty applied when any evidence item is partial
const PARTIALITY_PENALTY: f64 = 0.2;

/// Fused score for one artifact or group
#[derive(Debug, Clone, PartialEq)]
pub struct FusedScore {
    /// Bloat score, 0-100
    pub bloat_score: u8,

    /// Fused confidence, 0-1
    pub confidence: f64,

    /// Severity band of the score
    pub severity: Severity,

    /// Confidence band of the fused confidence
    pub confidence_band: ConfidenceBand,

    /// Count of distinct evidence sources
    pub distinct_sources: usize,

    /// Whether any contributing evidence was partial
    pub partial: bool,
}

/// Fuse an evidence multiset. Empty input scores zero with zero confidence.
pub fn fuse(evidence: &[Evidence]) -> FusedScore {
    if evidence.is_empty() {
        return FusedScore {
            bloat_score: 0,
            confidence: 0.0,
            severity: Severity::Low,
            confidence_band: ConfidenceBand::Low,
            distinct_sources: 0,
            partial: false,
        };
    }

    let mut survival = 1.0f64;
    let mut confidence_sum = 0.0f64;
    let mut partial = false;
    for item in evidence {
        survival *= 1.0 - item.strength().clamp(0.0, 1.0);
        confidence_sum += item.confidence;
        partial |= item.partial;
    }
    let raw_signal = 1.0 - survival;

    let mut sources: Vec<&str> = evidence.iter().map(|e| e.source.as_str()).collect();
    sources.sort_unstable();
    sources.dedup();
    let distinct_sources = sources.len();
    let corroboration = (distinct_sources as f64 / 3.0).min(1.0);

    let bloat_score = (100.0 * raw_signal * (0.5 + 0.5 * corroboration)).round() as u8;

    let mean_confidence = confidence_sum / evidence.len() as f64;
    let penalty = if partial { PARTIALITY_PENALTY } else { 0.0 };
    let confidence = (mean_confidence * corroboration * (1.0 - penalty)).clamp(0.0, 1.0);

    FusedScore {
        bloat_score: bloat_score.min(100),
        confidence,
        severity: Severity::from_score(bloat_score),
        confidence_band: ConfidenceBand::from_confidence(confidence),
        distinct_sources,
        partial,
    }
}

/// Accumulate a flat evidence stream into per-artifact multisets.
///
/// The map is the only cross-stage shared state in a scan and is owned by
/// the fusion side; collectors only ever send messages.
pub fn accumulate(evidence: Vec<Evidence>) -> AHashMap<String, Vec<Evidence>> {
    let mut map: AHashMap<String, Vec<Evidence>> = AHashMap::new();
    for item in evidence {
        map.entry(item.artifact_id.clone()).or_default().push(item);
    }
    // Within-artifact order must not leak collector scheduling
    for items in map.values_mut() {
        items.sort_by(|a, b| {
            a.source
                .as_str()
                .cmp(b.source.as_str())
                .then_with(|| a.signal_kind.as_str().cmp(b.signal_kind.as_str()))
                .then_with(|| {
                    OrderedFloat(b.strength()).cmp(&OrderedFloat(a.strength()))
                })
                .then_with(|| format!("{:?}", a.observed_value).cmp(&format!("{:?}", b.observed_value)))
        });
    }
    map
}

/// Canonical report ordering: score desc, then confidence desc, then token
/// impact desc, then path asc.
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(|a, b| {
        b.bloat_score
            .cmp(&a.bloat_score)
            .then_with(|| OrderedFloat(b.confidence).cmp(&OrderedFloat(a.confidence)))
            .then_with(|| b.estimated_token_impact.cmp(&a.estimated_token_impact))
            .then_with(|| a.artifact_path.cmp(&b.artifact_path))
    });
}
