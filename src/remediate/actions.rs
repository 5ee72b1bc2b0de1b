//! Remediation actions
//!
//! Applies a finding's recommendation to the working tree using the VCS's
//! own record-movement primitives, so every change is recoverable from the
//! session snapshot. Actions never commit; the executor commits only after
//! verification passes.

use std::path::Path;

use crate::error::Result;
use crate::git;
use crate::refcheck::ReferenceChecker;
use crate::schema::{ArtifactKind, Finding, Recommendation};

/// Prefix archived artifacts move under
pub const ARCHIVE_PREFIX: &str = "archive";

/// What applying an action did (or declined to do)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The tree was changed and needs verification
    Mutated { description: String },

    /// No auto-fix exists; recorded and left to a human, tree untouched
    ManualActionRequired { reason: String },

    /// Preconditions failed (ambiguous references); tree untouched
    Blocked { reason: String },
}

/// Apply a finding's recommendation. Precondition checks run before any
/// mutation, so a `Blocked` outcome guarantees an untouched tree.
pub fn apply_action(
    root: &Path,
    finding: &Finding,
    checker: &ReferenceChecker,
) -> Result<ActionOutcome> {
    match finding.recommendation {
        Recommendation::Delete => apply_delete(root, finding),
        Recommendation::Archive => apply_archive(root, finding),
        Recommendation::Consolidate => apply_consolidate(root, finding, checker),
        Recommendation::Refactor => apply_refactor(root, finding),
        Recommendation::Keep => Ok(ActionOutcome::ManualActionRequired {
            reason: "KEEP findings are never applied".to_string(),
        }),
    }
}

fn apply_delete(root: &Path, finding: &Finding) -> Result<ActionOutcome> {
    if finding.artifact_kind == ArtifactKind::Dependency {
        let (manifest, name) = match finding.artifact_path.split_once('#') {
            Some(pair) => pair,
            None => {
                return Ok(ActionOutcome::Blocked {
                    reason: format!("unparsable dependency artifact '{}'", finding.artifact_path),
                })
            }
        };
        remove_dependency_entry(root, manifest, name)?;
        return Ok(ActionOutcome::Mutated {
            description: format!("removed dependency '{}' from {}", name, manifest),
        });
    }

    git::delete_path(root, &finding.artifact_path)?;
    Ok(ActionOutcome::Mutated {
        description: format!("deleted {}", finding.artifact_path),
    })
}

fn apply_archive(root: &Path, finding: &Finding) -> Result<ActionOutcome> {
    let destination = format!("{}/{}", ARCHIVE_PREFIX, finding.artifact_path);
    git::move_path(root, &finding.artifact_path, &destination)?;
    Ok(ActionOutcome::Mutated {
        description: format!("archived {} -> {}", finding.artifact_path, destination),
    })
}

fn apply_refactor(root: &Path, finding: &Finding) -> Result<ActionOutcome> {
    match &finding.fix_patch {
        Some(patch) => {
            git::apply_patch(root, patch)?;
            Ok(ActionOutcome::Mutated {
                description: format!("applied auto-fix patch to {}", finding.artifact_path),
            })
        }
        None => Ok(ActionOutcome::ManualActionRequired {
            reason: format!(
                "no auto-fix patch for {}; refactor requires manual action",
                finding.artifact_path
            ),
        }),
    }
}

/// Merge a duplicate group into its canonical member.
///
/// Inbound references by full path are rewritten to the canonical path
/// (unambiguous). References by bare module stem cannot be resolved safely;
/// they block the action before any mutation, and the executor records the
/// finding as a refactor suggestion instead.
fn apply_consolidate(
    root: &Path,
    finding: &Finding,
    checker: &ReferenceChecker,
) -> Result<ActionOutcome> {
    let canonical = finding.artifact_path.as_str();
    let duplicates: Vec<String> = finding
        .affected_artifacts
        .iter()
        .filter_map(|id| id.split_once(':').map(|(_, p)| p.to_string()))
        .filter(|p| p != canonical)
        .collect();
    if duplicates.is_empty() {
        return Ok(ActionOutcome::Blocked {
            reason: "consolidation group has no non-canonical members".to_string(),
        });
    }

    // Precondition pass: every duplicate must be free of ambiguous inbound
    // references before anything is rewritten.
    for duplicate in &duplicates {
        let stem = file_stem(duplicate);
        let path_refs = checker.count_references(duplicate, Some(duplicate.as_str()))?;
        let stem_refs = checker.count_references(&stem, Some(duplicate.as_str()))?;
        if stem_refs > path_refs {
            return Ok(ActionOutcome::Blocked {
                reason: format!(
                    "{} is referenced by bare name; consolidation would be ambiguous",
                    duplicate
                ),
            });
        }
    }

    // Mutation pass
    for duplicate in &duplicates {
        for reference in checker.find_references(duplicate, Some(duplicate.as_str()))? {
            let ref_path = root.join(&reference.file);
            let contents = std::fs::read_to_string(&ref_path)?;
            std::fs::write(&ref_path, contents.replace(duplicate, canonical))?;
        }
        git::delete_path(root, duplicate)?;
    }

    Ok(ActionOutcome::Mutated {
        description: format!(
            "consolidated {} duplicate(s) into {}",
            duplicates.len(),
            canonical
        ),
    })
}

fn file_stem(path: &str) -> String {
    path.rsplit('/')
        .next()
        .and_then(|f| f.split('.').next())
        .unwrap_or("")
        .to_string()
}

/// Drop a dependency declaration from a manifest. package.json is rewritten
/// structurally; the TOML and requirements formats are edited line-wise.
fn remove_dependency_entry(root: &Path, manifest: &str, name: &str) -> Result<()> {
    let path = root.join(manifest);
    let contents = std::fs::read_to_string(&path)?;

    let updated = if manifest.ends_with("package.json") {
        let mut parsed: serde_json::Value = serde_json::from_str(&contents)?;
        if let Some(deps) = parsed
            .get_mut("dependencies")
            .and_then(|d| d.as_object_mut())
        {
            deps.remove(name);
        }
        let mut out = serde_json::to_string_pretty(&parsed)?;
        out.push('\n');
        out
    } else if manifest.ends_with("requirements.txt") {
        let mut out = String::new();
        for line in contents.lines() {
            let spec_name = line
                .trim()
                .split(|c: char| !c.is_alphanumeric() && c != '-' && c != '_' && c != '.')
                .next()
                .unwrap_or("");
            if !spec_name.eq_ignore_ascii_case(name) {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    } else {
        // TOML manifests: drop the declaration line for this name
        let mut out = String::new();
        for line in contents.lines() {
            let trimmed = line.trim_start();
            let declares = trimmed.starts_with(&format!("{} =", name))
                || trimmed.starts_with(&format!("\"{}\" =", name))
                || trimmed.starts_with(&format!("{}=", name));
            if !declares {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    };

    std::fs::write(&path, updated)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Evidence, EvidenceSource, RiskTier, Severity, SignalKind};
    use std::process::Command;

    fn init_repo(dir: &Path) {
        for args in [
            vec!["init", "-q"],
            vec!["config", "user.email", "audit@test"],
            vec!["config", "user.name", "Audit Test"],
        ] {
            Command::new("git").current_dir(dir).args(&args).output().unwrap();
        }
    }

    fn finding(path: &str, kind: ArtifactKind, rec: Recommendation) -> Finding {
        Finding {
            finding_id: "f".into(),
            artifact_path: path.to_string(),
            artifact_kind: kind,
            artifact_hash: "h".into(),
            bloat_score: 90,
            confidence: 0.9,
            severity: Severity::High,
            risk_tier: RiskTier::Low,
            recommendation: rec,
            estimated_token_impact: 0,
            affected_artifacts: vec![format!("{}:{}", kind.as_str(), path)],
            rationale: String::new(),
            fix_patch: None,
            evidence: vec![Evidence::new(
                format!("{}:{}", kind.as_str(), path),
                EvidenceSource::GitHistory,
                SignalKind::Stale,
                0.9,
                0.9,
                "test-1",
            )],
        }
    }

    #[test]
    fn test_delete_file() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        std::fs::write(dir.path().join("dead.py"), "x = 1\n").unwrap();
        git::commit_all(dir.path(), "seed").unwrap();

        let checker = ReferenceChecker::new(dir.path());
        let f = finding("dead.py", ArtifactKind::File, Recommendation::Delete);
        let outcome = apply_action(dir.path(), &f, &checker).unwrap();
        assert!(matches!(outcome, ActionOutcome::Mutated { .. }));
        assert!(!dir.path().join("dead.py").exists());
    }

    #[test]
    fn test_archive_moves_under_prefix() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/dusty.md"), "# Dusty\n").unwrap();
        git::commit_all(dir.path(), "seed").unwrap();

        let checker = ReferenceChecker::new(dir.path());
        let f = finding("docs/dusty.md", ArtifactKind::Doc, Recommendation::Archive);
        let outcome = apply_action(dir.path(), &f, &checker).unwrap();
        assert!(matches!(outcome, ActionOutcome::Mutated { .. }));
        assert!(dir.path().join("archive/docs/dusty.md").exists());
        assert!(!dir.path().join("docs/dusty.md").exists());
    }

    #[test]
    fn test_refactor_without_patch_is_manual() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        std::fs::write(dir.path().join("big.rs"), "fn main() {}\n").unwrap();
        git::commit_all(dir.path(), "seed").unwrap();

        let checker = ReferenceChecker::new(dir.path());
        let f = finding("big.rs", ArtifactKind::File, Recommendation::Refactor);
        let outcome = apply_action(dir.path(), &f, &checker).unwrap();
        assert!(matches!(outcome, ActionOutcome::ManualActionRequired { .. }));
        // Tree untouched
        assert!(dir.path().join("big.rs").exists());
    }

    #[test]
    fn test_consolidate_rewrites_path_references() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        std::fs::create_dir_all(dir.path().join("docs/archive")).unwrap();
        std::fs::write(dir.path().join("docs/setup.md"), "# Setup\ncanonical\n").unwrap();
        std::fs::write(
            dir.path().join("docs/archive/old-setup.md"),
            "# Setup\nduplicate\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("docs/index.md"),
            "See docs/archive/old-setup.md for setup.\n",
        )
        .unwrap();
        git::commit_all(dir.path(), "seed").unwrap();

        let checker = ReferenceChecker::new(dir.path());
        let mut f = finding("docs/setup.md", ArtifactKind::Doc, Recommendation::Consolidate);
        f.affected_artifacts = vec![
            "doc:docs/setup.md".to_string(),
            "doc:docs/archive/old-setup.md".to_string(),
        ];

        let outcome = apply_action(dir.path(), &f, &checker).unwrap();
        assert!(matches!(outcome, ActionOutcome::Mutated { .. }));
        assert!(!dir.path().join("docs/archive/old-setup.md").exists());
        let index = std::fs::read_to_string(dir.path().join("docs/index.md")).unwrap();
        assert!(index.contains("docs/setup.md"));
        assert!(!index.contains("old-setup.md"));
    }

    #[test]
    fn test_consolidate_blocks_on_bare_name_references() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/util.py"), "def canonical():\n    pass\n").unwrap();
        std::fs::write(dir.path().join("src/util_old.py"), "def canonical():\n    pass\n").unwrap();
        // Bare module-name import: rewriting this is ambiguous
        std::fs::write(dir.path().join("src/app.py"), "import util_old\n").unwrap();
        git::commit_all(dir.path(), "seed").unwrap();

        let checker = ReferenceChecker::new(dir.path());
        let mut f = finding("src/util.py", ArtifactKind::File, Recommendation::Consolidate);
        f.affected_artifacts = vec![
            "file:src/util.py".to_string(),
            "file:src/util_old.py".to_string(),
        ];

        let outcome = apply_action(dir.path(), &f, &checker).unwrap();
        assert!(matches!(outcome, ActionOutcome::Blocked { .. }));
        // Nothing was touched
        assert!(dir.path().join("src/util_old.py").exists());
        let app = std::fs::read_to_string(dir.path().join("src/app.py")).unwrap();
        assert_eq!(app, "import util_old\n");
    }

    #[test]
    fn test_remove_dependency_from_requirements() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        std::fs::write(
            dir.path().join("requirements.txt"),
            "requests>=2.0\nleftpad==1.0\nflask==3.0\n",
        )
        .unwrap();
        git::commit_all(dir.path(), "seed").unwrap();

        let checker = ReferenceChecker::new(dir.path());
        let f = finding(
            "requirements.txt#leftpad",
            ArtifactKind::Dependency,
            Recommendation::Delete,
        );
        let outcome = apply_action(dir.path(), &f, &checker).unwrap();
        assert!(matches!(outcome, ActionOutcome::Mutated { .. }));

        let contents = std::fs::read_to_string(dir.path().join("requirements.txt")).unwrap();
        assert!(!contents.contains("leftpad"));
        assert!(contents.contains("requests"));
        assert!(contents.contains("flask"));
    }

    #[test]
    fn test_remove_dependency_from_cargo_manifest() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        std::fs::write(
            dir.path().join("Cargo.toml"),
            "[package]\nname = \"demo\"\n\n[dependencies]\nserde = \"1.0\"\nunused-crate = \"0.1\"\n",
        )
        .unwrap();
        git::commit_all(dir.path(), "seed").unwrap();

        let checker = ReferenceChecker::new(dir.path());
        let f = finding(
            "Cargo.toml#unused-crate",
            ArtifactKind::Dependency,
            Recommendation::Delete,
        );
        apply_action(dir.path(), &f, &checker).unwrap();

        let contents = std::fs::read_to_string(dir.path().join("Cargo.toml")).unwrap();
        assert!(!contents.contains("unused-crate"));
        assert!(contents.contains("serde"));
    }
}
