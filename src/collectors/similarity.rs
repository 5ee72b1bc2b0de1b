//! Similarity collector: near-duplicate detection over code and docs
//!
//! Two-phase matching, cheap filter first:
//!
//! 1. **Candidates**: token-shingle MinHash signatures; pairs whose estimated
//!    Jaccard reaches the candidate threshold move on.
//! 2. **Confirmation**: token-frequency cosine similarity against the confirm
//!    threshold. Documentation pairs get a second chance through heading-tree
//!    structural similarity, which promotes a match to high weight even when
//!    the prose diverges.
//!
//! Confirmed pairs are merged into groups; one evidence item is attached to
//! every member of a group, all referencing the same group id. Repeated
//! blocks inside a single file are a separate signal and never produce
//! cross-file evidence.

use std::collections::HashMap;
use std::sync::mpsc;

use ahash::AHashMap;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;

use super::{Collector, ScanContext};
use crate::artifacts::is_generated;
use crate::config::AuditConfig;
use crate::error::Result;
use crate::schema::{
    fnv1a_hash, Artifact, ArtifactKind, Evidence, EvidenceSource, FocusArea, ObservedValue,
    SignalKind,
};

const DETECTOR_VERSION: &str = "similarity-2.0.1";

/// MinHash signature width
const NUM_HASHES: usize = 64;

/// Token shingle length
const SHINGLE_SIZE: usize = 5;

/// Files with fewer normalized tokens than this are too small to compare
const MIN_TOKENS: usize = 30;

/// Repetitions of an in-file block before it counts as self-similarity
const SELF_SIMILARITY_REPEATS: usize = 3;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9_]+").expect("token regex"));

static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").expect("heading regex"));

static SEEDS: Lazy<[u64; NUM_HASHES]> = Lazy::new(|| {
    let mut seeds = [0u64; NUM_HASHES];
    for (i, seed) in seeds.iter_mut().enumerate() {
        *seed = fnv1a_hash(&format!("minhash-seed-{}", i));
    }
    seeds
});

/// Near-duplicate detector over the artifact stream
#[derive(Debug, Default)]
pub struct SimilarityCollector;

impl SimilarityCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Collector for SimilarityCollector {
    fn name(&self) -> &'static str {
        "similarity"
    }

    fn source(&self) -> EvidenceSource {
        EvidenceSource::Similarity
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
        let fingerprints: Vec<Fingerprint> = artifacts
            .par_iter()
            .filter_map(|artifact| fingerprint(ctx, artifact))
            .collect();
        ctx.check_cancelled()?;

        // Self-similarity first: independent of the cross-file pass
        for fp in &fingerprints {
            if fp.repeated_blocks >= SELF_SIMILARITY_REPEATS {
                tx.send(
                    Evidence::new(
                        fp.artifact_id.clone(),
                        EvidenceSource::Similarity,
                        SignalKind::DuplicatedBlock,
                        0.4,
                        0.7,
                        DETECTOR_VERSION,
                    )
                    .with_observed(ObservedValue::Count(fp.repeated_blocks as u64)),
                )
                .ok();
            }
        }

        let pairs = confirmed_pairs(ctx, &fingerprints);
        ctx.check_cancelled()?;

        for group in build_groups(&fingerprints, &pairs) {
            for (artifact_id, similarity) in &group.members {
                tx.send(
                    Evidence::new(
                        artifact_id.clone(),
                        EvidenceSource::Similarity,
                        SignalKind::NearDuplicate,
                        *similarity,
                        0.85,
                        DETECTOR_VERSION,
                    )
                    .with_observed(ObservedValue::Group(group.id.clone())),
                )
                .ok();
            }
        }
        Ok(())
    }
}

// ============================================================================
// Fingerprints
// ============================================================================

struct Fingerprint {
    artifact_id: String,
    is_doc: bool,
    minhash: [u64; NUM_HASHES],
    token_freqs: AHashMap<u64, usize>,
    headings: Vec<String>,
    repeated_blocks: usize,
}

fn is_template_path(path: &str) -> bool {
    path.split('/').any(|c| c.eq_ignore_ascii_case("templates"))
        || path.ends_with(".tpl")
        || path.ends_with(".hbs")
        || path.ends_with(".j2")
}

fn fingerprint(ctx: &ScanContext, artifact: &Artifact) -> Option<Fingerprint> {
    if artifact.kind != ArtifactKind::File && artifact.kind != ArtifactKind::Doc {
        return None;
    }
    if is_template_path(&artifact.path) {
        return None;
    }
    let source = std::fs::read_to_string(ctx.root().join(&artifact.path)).ok()?;
    if is_generated(&source) {
        return None;
    }

    let tokens: Vec<u64> = TOKEN_RE
        .find_iter(&source)
        .map(|m| fnv1a_hash(&m.as_str().to_lowercase()))
        .collect();
    if tokens.len() < MIN_TOKENS {
        return None;
    }

    let mut token_freqs: AHashMap<u64, usize> = AHashMap::new();
    for token in &tokens {
        *token_freqs.entry(*token).or_default() += 1;
    }

    let mut minhash = [u64::MAX; NUM_HASHES];
    for window in tokens.windows(SHINGLE_SIZE) {
        let mut shingle: u64 = 0xcbf29ce484222325;
        for token in window {
            shingle ^= token;
            shingle = shingle.wrapping_mul(0x100000001b3);
        }
        for (slot, seed) in minhash.iter_mut().zip(SEEDS.iter()) {
            let h = (shingle ^ seed).wrapping_mul(0x100000001b3);
            if h < *slot {
                *slot = h;
            }
        }
    }

    let headings = if artifact.kind == ArtifactKind::Doc {
        source
            .lines()
            .filter_map(|line| {
                HEADING_RE.captures(line).map(|caps| {
                    format!("{} {}", caps[1].len(), caps[2].trim().to_lowercase())
                })
            })
            .take(200)
            .collect()
    } else {
        Vec::new()
    };

    Some(Fingerprint {
        artifact_id: artifact.id(),
        is_doc: artifact.kind == ArtifactKind::Doc,
        minhash,
        token_freqs,
        headings,
        repeated_blocks: count_repeated_blocks(&source),
    })
}

/// Largest repeat count among normalized in-file line blocks
fn count_repeated_blocks(source: &str) -> usize {
    let lines: Vec<String> = source
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    if lines.len() < SHINGLE_SIZE {
        return 0;
    }

    let mut counts: AHashMap<u64, usize> = AHashMap::new();
    for window in lines.windows(SHINGLE_SIZE) {
        let key = fnv1a_hash(&window.join("\n"));
        *counts.entry(key).or_default() += 1;
    }
    counts.values().copied().max().unwrap_or(0)
}

// ============================================================================
// Pair confirmation
// ============================================================================

struct ConfirmedPair {
    a: usize,
    b: usize,
    similarity: f64,
}

fn estimated_jaccard(a: &[u64; NUM_HASHES], b: &[u64; NUM_HASHES]) -> f64 {
    let matching = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
    matching as f64 / NUM_HASHES as f64
}

fn cosine_similarity(a: &AHashMap<u64, usize>, b: &AHashMap<u64, usize>) -> f64 {
    let mut dot = 0.0f64;
    for (token, count) in a {
        if let Some(other) = b.get(token) {
            dot += (*count as f64) * (*other as f64);
        }
    }
    let norm_a: f64 = a.values().map(|c| (*c as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.values().map(|c| (*c as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Longest-common-subsequence ratio over two heading sequences
fn heading_similarity(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let mut table = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for (i, ha) in a.iter().enumerate() {
        for (j, hb) in b.iter().enumerate() {
            table[i + 1][j + 1] = if ha == hb {
                table[i][j] + 1
            } else {
                table[i][j + 1].max(table[i + 1][j])
            };
        }
    }
    table[a.len()][b.len()] as f64 / a.len().max(b.len()) as f64
}

fn confirmed_pairs(ctx: &ScanContext, fingerprints: &[Fingerprint]) -> Vec<ConfirmedPair> {
    let thresholds = &ctx.config.thresholds;
    let mut pairs = Vec::new();

    for i in 0..fingerprints.len() {
        for j in (i + 1)..fingerprints.len() {
            let (fa, fb) = (&fingerprints[i], &fingerprints[j]);
            if fa.is_doc != fb.is_doc {
                continue;
            }

            // Docs with real heading trees stay candidates even when the
            // shingle gate fails: structure can match while prose diverges.
            let structural_candidate =
                fa.is_doc && fa.headings.len() >= 3 && fb.headings.len() >= 3;
            if estimated_jaccard(&fa.minhash, &fb.minhash) < thresholds.similarity_candidate
                && !structural_candidate
            {
                continue;
            }

            let cosine = cosine_similarity(&fa.token_freqs, &fb.token_freqs);
            let mut similarity = cosine;
            let mut confirmed = cosine >= thresholds.similarity_confirm;

            // Structural match promotes doc pairs even when prose varies
            if fa.is_doc && !confirmed {
                let structural = heading_similarity(&fa.headings, &fb.headings);
                if structural >= thresholds.similarity_structural {
                    confirmed = true;
                    similarity = cosine.max(0.9);
                }
            }

            if confirmed {
                pairs.push(ConfirmedPair {
                    a: i,
                    b: j,
                    similarity,
                });
            }
        }
    }
    pairs
}

// ============================================================================
// Grouping
// ============================================================================

struct SimilarityGroup {
    id: String,
    /// (artifact_id, best pair similarity for that member)
    members: Vec<(String, f64)>,
}

fn build_groups(fingerprints: &[Fingerprint], pairs: &[ConfirmedPair]) -> Vec<SimilarityGroup> {
    // Union-find over fingerprint indices
    let mut parent: Vec<usize> = (0..fingerprints.len()).collect();

    fn find(parent: &mut Vec<usize>, x: usize) -> usize {
        let mut root = x;
        while parent[root] != root {
            root = parent[root];
        }
        let mut cursor = x;
        while parent[cursor] != root {
            let next = parent[cursor];
            parent[cursor] = root;
            cursor = next;
        }
        root
    }

    let mut best: HashMap<usize, f64> = HashMap::new();
    for pair in pairs {
        let ra = find(&mut parent, pair.a);
        let rb = find(&mut parent, pair.b);
        if ra != rb {
            parent[ra.max(rb)] = ra.min(rb);
        }
        for idx in [pair.a, pair.b] {
            let entry = best.entry(idx).or_insert(0.0);
            if pair.similarity > *entry {
                *entry = pair.similarity;
            }
        }
    }

    let mut by_root: HashMap<usize, Vec<usize>> = HashMap::new();
    for idx in best.keys() {
        let root = find(&mut parent, *idx);
        by_root.entry(root).or_default().push(*idx);
    }

    let mut groups: Vec<SimilarityGroup> = by_root
        .into_values()
        .filter(|members| members.len() >= 2)
        .map(|mut members| {
            members.sort_unstable();
            let mut ids: Vec<String> = members
                .iter()
                .map(|&i| fingerprints[i].artifact_id.clone())
                .collect();
            ids.sort();
            let id = format!("grp-{:08x}", fnv1a_hash(&ids.join("|")) as u32);
            SimilarityGroup {
                id,
                members: members
                    .iter()
                    .map(|&i| {
                        (
                            fingerprints[i].artifact_id.clone(),
                            best.get(&i).copied().unwrap_or(0.0),
                        )
                    })
                    .collect(),
            }
        })
        .collect();
    groups.sort_by(|a, b| a.id.cmp(&b.id));
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Artifact;
    use std::path::PathBuf;

    fn seed(root: &std::path::Path, path: &str, contents: &str) -> Artifact {
        let full = root.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(&full, contents).unwrap();
        Artifact {
            path: path.to_string(),
            kind: if path.ends_with(".md") {
                ArtifactKind::Doc
            } else {
                ArtifactKind::File
            },
            byte_size: contents.len() as u64,
            line_count: contents.lines().count(),
            content_hash: "h".into(),
            last_modified: None,
            inbound_refs: None,
        }
    }

    fn run(root: &std::path::Path, artifacts: &[Artifact]) -> Vec<Evidence> {
        let mut config = AuditConfig::default();
        config.root = PathBuf::from(root);
        let ctx = ScanContext::new(config);
        let (tx, rx) = mpsc::channel();
        SimilarityCollector::new()
            .collect(&ctx, artifacts, &tx)
            .unwrap();
        drop(tx);
        rx.into_iter().collect()
    }

    fn paragraphs(lines: &[&str]) -> String {
        lines.join("\n")
    }

    #[test]
    fn test_near_identical_files_grouped() {
        let dir = tempfile::tempdir().unwrap();
        let body: Vec<String> = (0..40)
            .map(|i| format!("let value_{} = compute_total(base, rate, {});", i, i))
            .collect();
        let body_lines: Vec<&str> = body.iter().map(|s| s.as_str()).collect();
        let a = seed(dir.path(), "src/one.rs", &paragraphs(&body_lines));
        let b = seed(dir.path(), "src/two.rs", &paragraphs(&body_lines));

        let evidence = run(dir.path(), &[a, b]);
        let dupes: Vec<&Evidence> = evidence
            .iter()
            .filter(|e| e.signal_kind == SignalKind::NearDuplicate)
            .collect();
        assert_eq!(dupes.len(), 2);
        // Same group id on both members
        assert_eq!(dupes[0].observed_value, dupes[1].observed_value);
        assert!(dupes.iter().all(|e| e.weight >= 0.99));
    }

    #[test]
    fn test_unrelated_files_not_grouped() {
        let dir = tempfile::tempdir().unwrap();
        let a_body: Vec<String> = (0..40)
            .map(|i| format!("let alpha_{} = parse_header(buffer, {});", i, i))
            .collect();
        let b_body: Vec<String> = (0..40)
            .map(|i| format!("conn.execute_query(statement_{}, params, {});", i, i))
            .collect();
        let a_lines: Vec<&str> = a_body.iter().map(|s| s.as_str()).collect();
        let b_lines: Vec<&str> = b_body.iter().map(|s| s.as_str()).collect();
        let a = seed(dir.path(), "src/parse.rs", &paragraphs(&a_lines));
        let b = seed(dir.path(), "src/db.rs", &paragraphs(&b_lines));

        let evidence = run(dir.path(), &[a, b]);
        assert!(!evidence
            .iter()
            .any(|e| e.signal_kind == SignalKind::NearDuplicate));
    }

    #[test]
    fn test_generated_files_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let body: Vec<String> = (0..40)
            .map(|i| format!("let value_{} = compute_total(base, rate, {});", i, i))
            .collect();
        let lines: Vec<&str> = body.iter().map(|s| s.as_str()).collect();
        let generated = format!("// DO NOT EDIT\n{}", paragraphs(&lines));
        let a = seed(dir.path(), "src/gen_a.rs", &generated);
        let b = seed(dir.path(), "src/gen_b.rs", &generated);

        let evidence = run(dir.path(), &[a, b]);
        assert!(evidence.is_empty());
    }

    #[test]
    fn test_doc_structural_promotion() {
        let dir = tempfile::tempdir().unwrap();
        // Same heading tree, different prose in between
        let doc = |flavor: &str| {
            let mut out = String::new();
            for section in ["Install", "Configure", "Run", "Troubleshoot", "Upgrade", "Remove"] {
                out.push_str(&format!("## {}\n", section));
                for i in 0..8 {
                    out.push_str(&format!(
                        "The {} step {} notes for {} setups and machines.\n",
                        flavor, i, section
                    ));
                }
            }
            out
        };
        let a = seed(dir.path(), "docs/setup.md", &doc("current official"));
        let b = seed(dir.path(), "docs/old-setup-guide.md", &doc("legacy archived"));

        let evidence = run(dir.path(), &[a, b]);
        let dupes: Vec<&Evidence> = evidence
            .iter()
            .filter(|e| e.signal_kind == SignalKind::NearDuplicate)
            .collect();
        assert_eq!(dupes.len(), 2);
        assert!(dupes.iter().all(|e| e.weight >= 0.9));
    }

    #[test]
    fn test_self_similarity_is_separate_signal() {
        let dir = tempfile::tempdir().unwrap();
        let block = "let handle = acquire_resource(path, mode);\nlet guard = lock_exclusive(handle, owner);\nlet bytes = read_payload(handle, limit);\nvalidate_checksum(bytes, expected_digest);\nrelease_resource(handle, guard);\n";
        let source = block.repeat(4);
        let a = seed(dir.path(), "src/repeaty.rs", &source);

        let evidence = run(dir.path(), &[a]);
        assert!(evidence
            .iter()
            .any(|e| e.signal_kind == SignalKind::DuplicatedBlock));
        assert!(!evidence
            .iter()
            .any(|e| e.signal_kind == SignalKind::NearDuplicate));
    }

    #[test]
    fn test_heading_similarity_bounds() {
        let a: Vec<String> = vec!["2 install".into(), "2 configure".into(), "2 run".into()];
        let b = a.clone();
        assert_eq!(heading_similarity(&a, &b), 1.0);

        let c: Vec<String> = vec!["2 intro".into()];
        assert!(heading_similarity(&a, &c) < 0.34);
        assert_eq!(heading_similarity(&a, &[]), 0.0);
    }
}
