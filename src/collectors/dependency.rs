//! Dependency collector: declared-but-unreferenced external dependencies
//!
//! Parses the project manifests (Cargo.toml, package.json, pyproject.toml,
//! requirements.txt) into dependency artifacts, then probes the tree for any
//! production reference to each dependency's import name. Dev-only
//! dependencies are out of scope unless also declared for production.

use std::collections::BTreeMap;
use std::sync::mpsc;

use super::{Collector, ScanContext};
use crate::config::AuditConfig;
use crate::error::Result;
use crate::refcheck::ReferenceChecker;
use crate::schema::{
    fnv1a_hash, Artifact, ArtifactKind, Evidence, EvidenceSource, FocusArea, ObservedValue,
    SignalKind,
};

const DETECTOR_VERSION: &str = "dependency-1.0.2";

/// Manifest files never counted as references
const MANIFEST_FILES: &[&str] = &[
    "Cargo.toml",
    "Cargo.lock",
    "package.json",
    "package-lock.json",
    "pyproject.toml",
    "requirements.txt",
    "debloat.toml",
];

/// A production dependency declared in a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredDependency {
    /// Name as declared
    pub name: String,

    /// Manifest file (repo-relative) declaring it
    pub manifest: String,

    /// Declared version or constraint, best effort
    pub version: String,
}

impl DeclaredDependency {
    /// The token source code uses to import this dependency
    pub fn import_token(&self) -> String {
        self.name.replace('-', "_").to_lowercase()
    }

    fn artifact_path(&self) -> String {
        format!("{}#{}", self.manifest, self.name)
    }
}

/// Build dependency artifacts for the scan stream.
pub fn dependency_artifacts(config: &AuditConfig) -> Result<Vec<Artifact>> {
    Ok(declared_dependencies(config)?
        .into_iter()
        .map(|dep| {
            let descriptor = format!("{} {}", dep.name, dep.version);
            Artifact {
                path: dep.artifact_path(),
                kind: ArtifactKind::Dependency,
                byte_size: descriptor.len() as u64,
                line_count: 1,
                content_hash: format!("{:016x}", fnv1a_hash(&descriptor)),
                last_modified: None,
                inbound_refs: None,
            }
        })
        .collect())
}

/// All production dependencies across every recognized manifest, sorted by
/// `(manifest, name)` for deterministic output.
pub fn declared_dependencies(config: &AuditConfig) -> Result<Vec<DeclaredDependency>> {
    let mut deps: Vec<DeclaredDependency> = Vec::new();
    let root = &config.root;

    let cargo = root.join("Cargo.toml");
    if cargo.exists() {
        deps.extend(parse_cargo_manifest(&std::fs::read_to_string(&cargo)?));
    }
    let package = root.join("package.json");
    if package.exists() {
        deps.extend(parse_package_json(&std::fs::read_to_string(&package)?));
    }
    let pyproject = root.join("pyproject.toml");
    if pyproject.exists() {
        deps.extend(parse_pyproject(&std::fs::read_to_string(&pyproject)?));
    }
    let requirements = root.join("requirements.txt");
    if requirements.exists() {
        deps.extend(parse_requirements(&std::fs::read_to_string(&requirements)?));
    }

    deps.sort_by(|a, b| a.manifest.cmp(&b.manifest).then(a.name.cmp(&b.name)));
    deps.dedup();
    Ok(deps)
}

fn parse_cargo_manifest(contents: &str) -> Vec<DeclaredDependency> {
    let parsed: toml::Value = match contents.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };
    let mut deps = Vec::new();
    if let Some(table) = parsed.get("dependencies").and_then(|d| d.as_table()) {
        for (name, value) in table {
            let version = match value {
                toml::Value::String(v) => v.clone(),
                toml::Value::Table(t) => t
                    .get("version")
                    .and_then(|v| v.as_str())
                    .unwrap_or("*")
                    .to_string(),
                _ => "*".to_string(),
            };
            deps.push(DeclaredDependency {
                name: name.clone(),
                manifest: "Cargo.toml".to_string(),
                version,
            });
        }
    }
    deps
}

fn parse_package_json(contents: &str) -> Vec<DeclaredDependency> {
    let parsed: serde_json::Value = match serde_json::from_str(contents) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };
    let mut deps = Vec::new();
    if let Some(map) = parsed.get("dependencies").and_then(|d| d.as_object()) {
        for (name, version) in map {
            deps.push(DeclaredDependency {
                name: name.clone(),
                manifest: "package.json".to_string(),
                version: version.as_str().unwrap_or("*").to_string(),
            });
        }
    }
    deps
}

fn parse_pyproject(contents: &str) -> Vec<DeclaredDependency> {
    let parsed: toml::Value = match contents.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };
    let mut deps = Vec::new();
    if let Some(list) = parsed
        .get("project")
        .and_then(|p| p.get("dependencies"))
        .and_then(|d| d.as_array())
    {
        for entry in list {
            if let Some(spec) = entry.as_str() {
                if let Some(dep) = split_python_spec(spec, "pyproject.toml") {
                    deps.push(dep);
                }
            }
        }
    }
    deps
}

fn parse_requirements(contents: &str) -> Vec<DeclaredDependency> {
    contents
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('-'))
        .filter_map(|l| split_python_spec(l, "requirements.txt"))
        .collect()
}

/// Split "name>=1.0" style specifiers into name and constraint
fn split_python_spec(spec: &str, manifest: &str) -> Option<DeclaredDependency> {
    let name_end = spec
        .find(|c: char| !c.is_alphanumeric() && c != '-' && c != '_' && c != '.')
        .unwrap_or(spec.len());
    let name = spec[..name_end].trim();
    if name.is_empty() {
        return None;
    }
    Some(DeclaredDependency {
        name: name.to_string(),
        manifest: manifest.to_string(),
        version: spec[name_end..].trim().to_string(),
    })
}

/// Unused-dependency detector
#[derive(Debug, Default)]
pub struct DependencyCollector;

impl DependencyCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Collector for DependencyCollector {
    fn name(&self) -> &'static str {
        "dependency"
    }

    fn source(&self) -> EvidenceSource {
        EvidenceSource::Dependency
    }

    fn enabled(&self, config: &AuditConfig) -> bool {
        config.has_focus(FocusArea::Dependencies)
    }

    fn collect(
        &self,
        ctx: &ScanContext,
        artifacts: &[Artifact],
        tx: &mpsc::Sender<Evidence>,
    ) -> Result<()> {
        let declared: BTreeMap<String, DeclaredDependency> = declared_dependencies(&ctx.config)?
            .into_iter()
            .map(|d| (d.artifact_path(), d))
            .collect();
        let checker = ReferenceChecker::new(ctx.root());

        for artifact in artifacts {
            ctx.check_cancelled()?;
            if artifact.kind != ArtifactKind::Dependency {
                continue;
            }
            let dep = match declared.get(&artifact.path) {
                Some(d) => d,
                None => continue,
            };

            let references = checker.find_references(&dep.import_token(), None)?;
            let used = references.iter().any(|r| {
                let file_name = r.file.rsplit('/').next().unwrap_or(&r.file);
                !MANIFEST_FILES.contains(&file_name)
            });

            if !used {
                tx.send(
                    Evidence::new(
                        artifact.id(),
                        EvidenceSource::Dependency,
                        SignalKind::UnusedDependency,
                        0.9,
                        0.9,
                        DETECTOR_VERSION,
                    )
                    .with_observed(ObservedValue::Text(dep.name.clone())),
                )
                .ok();
                // The textual probe itself is an independent static check and
                // is what lets an unused dependency qualify for deletion.
                tx.send(
                    Evidence::new(
                        artifact.id(),
                        EvidenceSource::StaticAnalysis,
                        SignalKind::ZeroReferences,
                        0.8,
                        0.9,
                        DETECTOR_VERSION,
                    )
                    .with_observed(ObservedValue::Count(0)),
                )
                .ok();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_cargo_dependencies() {
        let manifest = r#"
            [package]
            name = "demo"

            [dependencies]
            serde = { version = "1.0", features = ["derive"] }
            regex = "1.10"

            [dev-dependencies]
            tempfile = "3.8"
        "#;
        let deps = parse_cargo_manifest(manifest);
        let names: Vec<&str> = deps.iter().map(|d| d.name.as_str()).collect();
        assert!(names.contains(&"serde"));
        assert!(names.contains(&"regex"));
        // Dev-only dependencies are excluded
        assert!(!names.contains(&"tempfile"));
    }

    #[test]
    fn test_parse_requirements() {
        let deps = parse_requirements("requests>=2.0\n# comment\nflask==3.0\n-r other.txt\n");
        let names: Vec<&str> = deps.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["requests", "flask"]);
    }

    #[test]
    fn test_import_token_normalization() {
        let dep = DeclaredDependency {
            name: "typing-extensions".into(),
            manifest: "requirements.txt".into(),
            version: ">=4".into(),
        };
        assert_eq!(dep.import_token(), "typing_extensions");
    }

    #[test]
    fn test_unused_dependency_flagged() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("requirements.txt"),
            "requests>=2.0\nleftpad==1.0\n",
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(
            dir.path().join("src/app.py"),
            "import requests\n\nrequests.get('http://example.com')\n",
        )
        .unwrap();

        let mut config = AuditConfig::default();
        config.root = PathBuf::from(dir.path());
        let artifacts = dependency_artifacts(&config).unwrap();
        assert_eq!(artifacts.len(), 2);

        let ctx = ScanContext::new(config);
        let (tx, rx) = mpsc::channel();
        DependencyCollector::new()
            .collect(&ctx, &artifacts, &tx)
            .unwrap();
        drop(tx);
        let evidence: Vec<Evidence> = rx.into_iter().collect();

        // Unused dependency plus the corroborating zero-reference probe
        assert_eq!(evidence.len(), 2);
        assert!(evidence
            .iter()
            .all(|e| e.artifact_id == "dependency:requirements.txt#leftpad"));
        let unused = evidence
            .iter()
            .find(|e| e.signal_kind == SignalKind::UnusedDependency)
            .unwrap();
        assert_eq!(unused.weight, 0.9);
        assert!(evidence
            .iter()
            .any(|e| e.signal_kind == SignalKind::ZeroReferences
                && e.source == EvidenceSource::StaticAnalysis));
    }
}
