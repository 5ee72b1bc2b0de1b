//! Core data model for bloat auditing
//!
//! Defines the three layers of the evidence pipeline: `Artifact` (what the
//! scan evaluates), `Evidence` (one signal about one artifact, from one
//! source) and `Finding` (the aggregated, scored recommendation). The
//! top-level `ScanReport` container is persisted by the report store and
//! consumed by the remediation executor.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Report schema version. Readers reject a different major.
pub const SCHEMA_VERSION: u32 = 1;

/// FNV-1a 64-bit hash for stable content and identity hashes
pub fn fnv1a_hash(input: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in input.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

// ============================================================================
// Artifacts
// ============================================================================

/// Kind of artifact the scan can evaluate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// A source or documentation file
    File,
    /// A named symbol inside a file
    Symbol,
    /// A documentation file evaluated under doc conventions
    Doc,
    /// A declared external dependency
    Dependency,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Symbol => "symbol",
            Self::Doc => "doc",
            Self::Dependency => "dependency",
        }
    }
}

/// A path-addressable unit evaluated by the scan.
///
/// `(path, kind)` is unique within a scan; `id()` encodes the pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Repo-relative path, `/`-normalized
    pub path: String,

    /// Artifact kind
    pub kind: ArtifactKind,

    /// Size in bytes
    pub byte_size: u64,

    /// Line count
    pub line_count: usize,

    /// Stable content hash (whitespace- and comment-insensitive)
    pub content_hash: String,

    /// Last-modified wall time (ISO-8601, if known)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,

    /// Inbound-reference count (per-language heuristic; None = unknown)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inbound_refs: Option<usize>,
}

impl Artifact {
    /// Stable artifact id: `kind:path`
    pub fn id(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.path)
    }
}

// ============================================================================
// Evidence
// ============================================================================

/// Producer of an evidence item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    Heuristic,
    GitHistory,
    StaticAnalysis,
    Similarity,
    Dependency,
}

impl EvidenceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heuristic => "heuristic",
            Self::GitHistory => "git_history",
            Self::StaticAnalysis => "static_analysis",
            Self::Similarity => "similarity",
            Self::Dependency => "dependency",
        }
    }
}

/// Closed set of signal kinds. Fusion arithmetic never inspects the kind,
/// so adding a variant does not touch the scoring path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Stale,
    ZeroReferences,
    UnusedImport,
    UnusedSymbol,
    NearDuplicate,
    LargeFunction,
    GodStructure,
    TightCoupling,
    CompleteGuidePattern,
    MagicLiteral,
    StaleTodo,
    Oversized,
    DuplicatedBlock,
    CyclomaticComplexityHigh,
    TreeShakeableDead,
    UnusedDependency,
    AuthorConcentration,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stale => "stale",
            Self::ZeroReferences => "zero_references",
            Self::UnusedImport => "unused_import",
            Self::UnusedSymbol => "unused_symbol",
            Self::NearDuplicate => "near_duplicate",
            Self::LargeFunction => "large_function",
            Self::GodStructure => "god_structure",
            Self::TightCoupling => "tight_coupling",
            Self::CompleteGuidePattern => "complete_guide_pattern",
            Self::MagicLiteral => "magic_literal",
            Self::StaleTodo => "stale_todo",
            Self::Oversized => "oversized",
            Self::DuplicatedBlock => "duplicated_block",
            Self::CyclomaticComplexityHigh => "cyclomatic_complexity_high",
            Self::TreeShakeableDead => "tree_shakeable_dead",
            Self::UnusedDependency => "unused_dependency",
            Self::AuthorConcentration => "author_concentration",
        }
    }
}

/// Typed payload recorded with an evidence item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ObservedValue {
    /// An age or duration in days
    Days(i64),
    /// An occurrence count
    Count(u64),
    /// A ratio in [0, 1] (similarity, coverage)
    Ratio(f64),
    /// Free-form detail (symbol name, literal, dependency name)
    Text(String),
    /// Similarity group id shared by every member of the group
    Group(String),
    /// Adapter-provided token impact estimate
    Tokens(u64),
}

/// A single signal about an artifact. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    /// Id of the artifact this signal is about
    pub artifact_id: String,

    /// Which collector produced it
    pub source: EvidenceSource,

    /// What was observed
    pub signal_kind: SignalKind,

    /// Signal strength in [0, 1]
    pub weight: f64,

    /// Detector confidence in [0, 1]
    pub confidence: f64,

    /// Typed payload backing the observation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_value: Option<ObservedValue>,

    /// Version tag of the producing detector
    pub detector_version: String,

    /// Set when the producing adapter timed out mid-run
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
}

impl Evidence {
    /// Create evidence with clamped weight and confidence
    pub fn new(
        artifact_id: impl Into<String>,
        source: EvidenceSource,
        signal_kind: SignalKind,
        weight: f64,
        confidence: f64,
        detector_version: &str,
    ) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            source,
            signal_kind,
            weight: weight.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
            observed_value: None,
            detector_version: detector_version.to_string(),
            partial: false,
        }
    }

    /// Attach an observed value
    pub fn with_observed(mut self, value: ObservedValue) -> Self {
        self.observed_value = Some(value);
        self
    }

    /// Flag as produced by a timed-out adapter
    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    /// Contribution to the noisy-OR product
    pub fn strength(&self) -> f64 {
        self.weight * self.confidence
    }
}

// ============================================================================
// Scoring bands
// ============================================================================

/// Severity band derived from the bloat score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Band mapping: HIGH >= 80, MEDIUM 60-79, LOW < 60
    pub fn from_score(score: u8) -> Self {
        match score {
            80.. => Severity::High,
            60..=79 => Severity::Medium,
            _ => Severity::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

/// Confidence band derived from fused confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfidenceBand {
    Low,
    Medium,
    High,
}

impl ConfidenceBand {
    /// Band mapping: HIGH >= 0.80, MEDIUM 0.60-0.79, LOW < 0.60
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.80 {
            ConfidenceBand::High
        } else if confidence >= 0.60 {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }
}

/// Executor applied-order classifier; distinct from scored severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// Raise one tier, saturating at HIGH
    pub fn raised(&self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium | Self::High => Self::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

/// Remediation recommendation for a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Delete,
    Refactor,
    Consolidate,
    Archive,
    Keep,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Refactor => "REFACTOR",
            Self::Consolidate => "CONSOLIDATE",
            Self::Archive => "ARCHIVE",
            Self::Keep => "KEEP",
        }
    }

    /// Ordering by how much of the tree the action removes or rewrites
    pub fn destructiveness(&self) -> u8 {
        match self {
            Self::Keep => 0,
            Self::Archive => 1,
            Self::Refactor => 2,
            Self::Consolidate => 3,
            Self::Delete => 4,
        }
    }

    /// One step down the destructiveness ladder
    pub fn downgraded(&self) -> Self {
        match self {
            Self::Delete => Self::Consolidate,
            Self::Consolidate => Self::Refactor,
            Self::Refactor => Self::Archive,
            Self::Archive | Self::Keep => Self::Keep,
        }
    }

    /// Whether applying this recommendation mutates the working tree
    pub fn is_destructive(&self) -> bool {
        !matches!(self, Self::Keep)
    }
}

// ============================================================================
// Findings
// ============================================================================

/// Aggregated, scored recommendation for an artifact or similarity group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Deterministic id: hash of affected artifact ids and dominant signal
    pub finding_id: String,

    /// Primary artifact path (repo-relative)
    pub artifact_path: String,

    /// Primary artifact kind
    pub artifact_kind: ArtifactKind,

    /// Stable content hash of the primary artifact at scan time
    pub artifact_hash: String,

    /// Fused bloat score, 0-100
    pub bloat_score: u8,

    /// Fused confidence, 0-1
    pub confidence: f64,

    /// Severity band from the bloat score
    pub severity: Severity,

    /// Executor risk tier
    pub risk_tier: RiskTier,

    /// Recommended remediation
    pub recommendation: Recommendation,

    /// Estimated token impact of remediating
    pub estimated_token_impact: u64,

    /// Every artifact id involved (singleton unless a similarity group)
    pub affected_artifacts: Vec<String>,

    /// Human-readable justification
    pub rationale: String,

    /// Adapter-supplied auto-fix patch (unified diff), when one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_patch: Option<String>,

    /// Supporting evidence (never empty)
    pub evidence: Vec<Evidence>,
}

impl Finding {
    /// Count of distinct evidence sources
    pub fn distinct_sources(&self) -> usize {
        let mut sources: Vec<&str> = self.evidence.iter().map(|e| e.source.as_str()).collect();
        sources.sort_unstable();
        sources.dedup();
        sources.len()
    }
}

/// Deterministic finding id over the sorted affected artifact set.
///
/// Stable across scans of an identical tree and across tool availability, so
/// reports from different runs are comparable by id. Within one report the
/// artifact set is collision-free: every artifact gets at most one
/// per-artifact finding, and similarity groups always span two or more.
pub fn compute_finding_id(affected_artifacts: &[String]) -> String {
    let mut ids: Vec<&str> = affected_artifacts.iter().map(|s| s.as_str()).collect();
    ids.sort_unstable();
    format!("{:016x}", fnv1a_hash(&ids.join("|")))
}

// ============================================================================
// Report container
// ============================================================================

/// Collector focus areas, restricting which collectors run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusArea {
    Code,
    Docs,
    Dependencies,
    Git,
}

impl FocusArea {
    pub fn all() -> Vec<FocusArea> {
        vec![Self::Code, Self::Docs, Self::Dependencies, Self::Git]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Docs => "docs",
            Self::Dependencies => "dependencies",
            Self::Git => "git",
        }
    }
}

/// Availability snapshot entry for one tool adapter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolStatus {
    /// Whether the tool was present at session start
    pub available: bool,

    /// Detected version, when the probe could read one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Whether the tool timed out and returned partial output
    #[serde(default)]
    pub partial: bool,

    /// Why the tool was unavailable or partial
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Top-level scan report. Read-only after emission; field order matches the
/// on-disk document layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    /// Report schema version
    pub schema_version: u32,

    /// UUID v4 for this scan
    pub scan_id: String,

    /// ISO-8601 UTC timestamp
    pub scan_timestamp: String,

    /// SHA of HEAD at scan time, when a VCS was present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_commit: Option<String>,

    /// Achieved analysis tier (may be demoted from the requested one)
    pub tier: u8,

    /// Collector focus in effect
    pub focus: Vec<FocusArea>,

    /// Adapter availability snapshot
    pub tool_availability: BTreeMap<String, ToolStatus>,

    /// FNV-1a digest of the effective configuration
    pub configuration_digest: String,

    /// Ranked findings
    pub findings: Vec<Finding>,
}
