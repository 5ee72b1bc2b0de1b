//! Heuristic collector: structural smells with no external tools
//!
//! Detects oversized artifacts against directory-role caps, god structures,
//! the "complete guide" documentation anti-pattern, repeated magic literals
//! and stale TODO/FIXME markers. Everything here is lexical; no parsing.

use std::collections::HashMap;
use std::sync::mpsc;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Collector, ScanContext};
use crate::config::{AuditConfig, DirRole};
use crate::error::Result;
use crate::git;
use crate::schema::{
    Artifact, ArtifactKind, Evidence, EvidenceSource, FocusArea, ObservedValue, SignalKind,
};

const DETECTOR_VERSION: &str = "heuristic-1.2.0";

/// Extensions treated as source code for structure heuristics
const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "jsx", "ts", "tsx", "go", "java", "c", "cpp", "cs", "rb", "kt",
];

/// Directory names marking a modules-style documentation tree
const MODULES_STYLE_DIRS: &[&str] = &["modules", "skills", "packs"];

/// Path components marking non-production contexts
const NON_PRODUCTION_DIRS: &[&str] = &[
    "test", "tests", "__tests__", "spec", "specs", "fixtures", "examples", "demos", "templates",
    "docs",
];

static DEFINITION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:fn|def)\s+([A-Za-z_][A-Za-z0-9_]*)|^\s*(?:export\s+)?(?:async\s+)?function\s+([A-Za-z_$][A-Za-z0-9_$]*)|^func\s+(?:\([^)]*\)\s*)?([A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("definition regex")
});

static COMPLETE_GUIDE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)complete[-_]?guide|comprehensive").expect("guide regex"));

static NUMERIC_LITERAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{2,}\b").expect("numeric regex"));

static STRING_LITERAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"\\\n]{4,})""#).expect("string regex"));

static CONST_CONTEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i:^\s*(?:pub\s+)?(?:const|static|final)\b)|^[A-Z_][A-Z_0-9]*\s*=")
        .expect("const regex")
});

static TODO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(TODO|FIXME)\b").expect("todo regex"));

/// Heuristic structural-smell collector
#[derive(Debug, Default)]
pub struct HeuristicCollector;

impl HeuristicCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Collector for HeuristicCollector {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn source(&self) -> EvidenceSource {
        EvidenceSource::Heuristic
    }

    fn enabled(&self, config: &AuditConfig) -> bool {
        config.has_focus(FocusArea::Code) || config.has_focus(FocusArea::Docs)
    }

    fn collect(
        &self,
        ctx: &ScanContext,
        artifacts: &[Artifact],
        tx: &mpsc::Sender<Evidence>,
    ) -> Result<()> {
        for artifact in artifacts {
            ctx.check_cancelled()?;
            if artifact.kind != ArtifactKind::File && artifact.kind != ArtifactKind::Doc {
                continue;
            }

            if let Some(ev) = size_evidence(ctx, artifact) {
                tx.send(ev).ok();
            }

            let source = match std::fs::read_to_string(ctx.root().join(&artifact.path)) {
                Ok(s) => s,
                Err(_) => continue,
            };

            if artifact.kind == ArtifactKind::Doc {
                if let Some(ev) = complete_guide_evidence(artifact) {
                    tx.send(ev).ok();
                }
                continue;
            }

            if !is_source_path(&artifact.path) {
                continue;
            }

            if let Some(ev) = god_structure_evidence(ctx, artifact, &source) {
                tx.send(ev).ok();
            }
            for ev in large_function_evidence(ctx, artifact, &source) {
                tx.send(ev).ok();
            }
            for ev in magic_literal_evidence(ctx, artifact, &source) {
                tx.send(ev).ok();
            }
            for ev in stale_todo_evidence(ctx, artifact, &source) {
                tx.send(ev).ok();
            }
        }
        Ok(())
    }
}

fn is_source_path(path: &str) -> bool {
    let extension = path.rsplit('.').next().unwrap_or("").to_lowercase();
    SOURCE_EXTENSIONS.contains(&extension.as_str())
}

fn in_non_production_path(path: &str) -> bool {
    path.split('/')
        .any(|c| NON_PRODUCTION_DIRS.contains(&c.to_lowercase().as_str()))
}

// ============================================================================
// Size & shape
// ============================================================================

/// Weight ramps linearly from the soft cap to 2x the cap, then saturates.
fn size_evidence(ctx: &ScanContext, artifact: &Artifact) -> Option<Evidence> {
    let conventions = &ctx.config.conventions;
    let role = conventions.classify(&artifact.path);
    let cap = match artifact.kind {
        ArtifactKind::Doc => conventions
            .line_cap(role)
            .unwrap_or(ctx.config.thresholds.source_file_lines),
        _ => match role {
            DirRole::Source => ctx.config.thresholds.source_file_lines,
            _ => conventions
                .line_cap(role)
                .unwrap_or(ctx.config.thresholds.source_file_lines),
        },
    };

    if artifact.line_count <= cap {
        return None;
    }
    let weight = ((artifact.line_count - cap) as f64 / cap as f64).clamp(0.0, 1.0);

    Some(
        Evidence::new(
            artifact.id(),
            EvidenceSource::Heuristic,
            SignalKind::Oversized,
            weight,
            0.9,
            DETECTOR_VERSION,
        )
        .with_observed(ObservedValue::Count(artifact.line_count as u64)),
    )
}

// ============================================================================
// God structures
// ============================================================================

/// Tokenize camelCase and snake_case identifiers
///
/// "handleUserLogin" -> ["handle", "user", "login"]
pub fn tokenize_identifier(name: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in name.chars() {
        if ch == '_' || ch == '-' {
            if !current.is_empty() {
                tokens.push(current.to_lowercase());
                current.clear();
            }
        } else if ch.is_uppercase() && !current.is_empty() {
            tokens.push(current.to_lowercase());
            current.clear();
            current.push(ch);
        } else {
            current.push(ch);
        }
    }

    if !current.is_empty() {
        tokens.push(current.to_lowercase());
    }

    tokens
}

fn definition_names(source: &str) -> Vec<String> {
    DEFINITION_RE
        .captures_iter(source)
        .filter_map(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string())
        })
        .collect()
}

/// A definitional unit with too many members whose names span several lexical
/// clusters (grouped by leading token root) is a god structure.
fn god_structure_evidence(
    ctx: &ScanContext,
    artifact: &Artifact,
    source: &str,
) -> Option<Evidence> {
    let thresholds = &ctx.config.thresholds;
    let names = definition_names(source);
    if names.len() <= thresholds.god_structure_methods {
        return None;
    }

    let mut roots: Vec<String> = names
        .iter()
        .filter_map(|n| tokenize_identifier(n).into_iter().next())
        .collect();
    roots.sort_unstable();
    roots.dedup();
    if roots.len() < thresholds.god_structure_clusters {
        return None;
    }

    let overshoot = names.len() - thresholds.god_structure_methods;
    let weight = (overshoot as f64 / thresholds.god_structure_methods as f64).clamp(0.2, 1.0);

    Some(
        Evidence::new(
            artifact.id(),
            EvidenceSource::Heuristic,
            SignalKind::GodStructure,
            weight,
            0.7,
            DETECTOR_VERSION,
        )
        .with_observed(ObservedValue::Count(names.len() as u64)),
    )
}

/// Span between successive definitions longer than the cap
fn large_function_evidence(
    ctx: &ScanContext,
    artifact: &Artifact,
    source: &str,
) -> Vec<Evidence> {
    let cap = ctx.config.thresholds.large_function_lines;
    let lines: Vec<&str> = source.lines().collect();

    let mut starts: Vec<(usize, String)> = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if let Some(caps) = DEFINITION_RE.captures(line) {
            if let Some(name) = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)) {
                starts.push((idx, name.as_str().to_string()));
            }
        }
    }

    let mut evidence = Vec::new();
    for (i, (start, name)) in starts.iter().enumerate() {
        let end = starts.get(i + 1).map(|(s, _)| *s).unwrap_or(lines.len());
        let length = end - start;
        if length > cap {
            let weight = ((length - cap) as f64 / cap as f64).clamp(0.0, 1.0);
            evidence.push(
                Evidence::new(
                    artifact.id(),
                    EvidenceSource::Heuristic,
                    SignalKind::LargeFunction,
                    weight,
                    0.6,
                    DETECTOR_VERSION,
                )
                .with_observed(ObservedValue::Text(name.clone())),
            );
        }
    }
    evidence
}

// ============================================================================
// Complete-guide docs
// ============================================================================

fn complete_guide_evidence(artifact: &Artifact) -> Option<Evidence> {
    let file_name = artifact.path.rsplit('/').next().unwrap_or(&artifact.path);
    if !COMPLETE_GUIDE_RE.is_match(file_name) {
        return None;
    }
    let nested_in_modules = artifact
        .path
        .split('/')
        .any(|c| MODULES_STYLE_DIRS.contains(&c.to_lowercase().as_str()));
    if !nested_in_modules {
        return None;
    }

    Some(
        Evidence::new(
            artifact.id(),
            EvidenceSource::Heuristic,
            SignalKind::CompleteGuidePattern,
            0.6,
            0.8,
            DETECTOR_VERSION,
        )
        .with_observed(ObservedValue::Text(file_name.to_string())),
    )
}

// ============================================================================
// Magic literals
// ============================================================================

fn magic_literal_evidence(
    ctx: &ScanContext,
    artifact: &Artifact,
    source: &str,
) -> Vec<Evidence> {
    if in_non_production_path(&artifact.path) {
        return Vec::new();
    }
    let min_count = ctx.config.thresholds.magic_literal_min_count;

    let mut counts: HashMap<String, usize> = HashMap::new();
    for line in source.lines() {
        if CONST_CONTEXT_RE.is_match(line) {
            continue;
        }
        for m in NUMERIC_LITERAL_RE.find_iter(line) {
            *counts.entry(m.as_str().to_string()).or_default() += 1;
        }
        for caps in STRING_LITERAL_RE.captures_iter(line) {
            *counts.entry(format!("\"{}\"", &caps[1])).or_default() += 1;
        }
    }

    let mut repeated: Vec<(String, usize)> = counts
        .into_iter()
        .filter(|(_, count)| *count >= min_count)
        .collect();
    repeated.sort();

    repeated
        .into_iter()
        .map(|(literal, count)| {
            Evidence::new(
                artifact.id(),
                EvidenceSource::Heuristic,
                SignalKind::MagicLiteral,
                0.3,
                0.6,
                DETECTOR_VERSION,
            )
            .with_observed(ObservedValue::Text(format!("{} x{}", literal, count)))
        })
        .collect()
}

// ============================================================================
// Stale TODO markers
// ============================================================================

/// Markers in production paths older than the staleness cutoff, dated by the
/// last blame touch of their line. Without a VCS no marker can be dated, so
/// none are emitted.
fn stale_todo_evidence(ctx: &ScanContext, artifact: &Artifact, source: &str) -> Vec<Evidence> {
    if ctx.git_stats.is_none() || in_non_production_path(&artifact.path) {
        return Vec::new();
    }
    let cutoff_days = ctx.config.thresholds.todo_staleness_days;
    let mut evidence = Vec::new();

    for (idx, line) in source.lines().enumerate() {
        if !TODO_RE.is_match(line) {
            continue;
        }
        let epoch = match git::blame_line_epoch(ctx.root(), &artifact.path, idx + 1) {
            Some(e) => e,
            None => continue,
        };
        let age_days = (ctx.now.timestamp() - epoch) / 86_400;
        if age_days <= cutoff_days {
            continue;
        }
        evidence.push(
            Evidence::new(
                artifact.id(),
                EvidenceSource::Heuristic,
                SignalKind::StaleTodo,
                0.4,
                0.8,
                DETECTOR_VERSION,
            )
            .with_observed(ObservedValue::Days(age_days)),
        );
    }
    evidence
}
