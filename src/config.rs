//! Audit configuration
//!
//! Loads `debloat.toml` from the project root when present and falls back to
//! defaults otherwise. Every numeric threshold used by the collectors is
//! overridable through the `[thresholds]` table; directory role conventions
//! live under `[conventions]`.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{AuditError, Result};
use crate::schema::{fnv1a_hash, FocusArea, RiskTier};

/// Name of the optional configuration file at the project root
pub const CONFIG_FILE_NAME: &str = "debloat.toml";

// ============================================================================
// Thresholds
// ============================================================================

/// Numeric thresholds for the signal collectors
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Soft cap for source files, in lines
    pub source_file_lines: usize,

    /// Method/function count that marks a god structure
    pub god_structure_methods: usize,

    /// Minimum lexical clusters among nested definition names
    pub god_structure_clusters: usize,

    /// Minimum repetitions before a literal counts as magic
    pub magic_literal_min_count: usize,

    /// TODO/FIXME markers younger than this are ignored (days)
    pub todo_staleness_days: i64,

    /// Staleness ramp start (days since last commit)
    pub stale_after_days: i64,

    /// Staleness ramp length; weight saturates at start + ramp (days)
    pub stale_ramp_days: i64,

    /// Churn lookback window (days)
    pub churn_window_days: i64,

    /// Commit count at which churn fully suppresses staleness
    pub churn_saturation: usize,

    /// Minimum age for orphan detection (days)
    pub orphan_age_days: i64,

    /// MinHash candidate threshold (estimated Jaccard)
    pub similarity_candidate: f64,

    /// Precise confirmation threshold
    pub similarity_confirm: f64,

    /// Doc heading-tree structural similarity threshold
    pub similarity_structural: f64,

    /// Cyclomatic complexity above which adapters flag a function
    pub complexity_threshold: usize,

    /// Function length (lines) above which the heuristic flags it
    pub large_function_lines: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            source_file_lines: 600,
            god_structure_methods: 15,
            god_structure_clusters: 3,
            magic_literal_min_count: 3,
            todo_staleness_days: 90,
            stale_after_days: 180,
            stale_ramp_days: 540,
            churn_window_days: 90,
            churn_saturation: 20,
            orphan_age_days: 365,
            similarity_candidate: 0.70,
            similarity_confirm: 0.85,
            similarity_structural: 0.80,
            complexity_threshold: 15,
            large_function_lines: 80,
        }
    }
}

// ============================================================================
// Directory conventions
// ============================================================================

/// Role a directory plays, read from path components
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirRole {
    Reference,
    Tutorial,
    Example,
    Skill,
    Source,
}

/// Directory role conventions with per-role line caps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConventions {
    /// Path components marking reference documentation
    pub reference_dirs: Vec<String>,

    /// Path components marking tutorial documentation
    pub tutorial_dirs: Vec<String>,

    /// Path components marking example code
    pub example_dirs: Vec<String>,

    /// Path components marking skill/instruction files
    pub skill_dirs: Vec<String>,

    /// Line cap for reference docs
    pub reference_cap: usize,

    /// Line cap for tutorial docs
    pub tutorial_cap: usize,

    /// Line cap for examples
    pub example_cap: usize,

    /// Line cap for skill/instruction files
    pub skill_cap: usize,
}

impl Default for DirectoryConventions {
    fn default() -> Self {
        Self {
            reference_dirs: vec!["reference".into(), "references".into(), "api".into()],
            tutorial_dirs: vec!["tutorial".into(), "tutorials".into(), "guides".into()],
            example_dirs: vec!["examples".into(), "samples".into(), "demos".into()],
            skill_dirs: vec!["skills".into(), "instructions".into(), "prompts".into()],
            reference_cap: 500,
            tutorial_cap: 1000,
            example_cap: 800,
            skill_cap: 300,
        }
    }
}

impl DirectoryConventions {
    /// Classify a repo-relative path by its directory components
    pub fn classify(&self, path: &str) -> DirRole {
        let components: Vec<&str> = path.split('/').collect();
        // The file name itself never determines the role
        let dirs = &components[..components.len().saturating_sub(1)];
        for dir in dirs {
            let lower = dir.to_lowercase();
            if self.reference_dirs.iter().any(|d| d == &lower) {
                return DirRole::Reference;
            }
            if self.tutorial_dirs.iter().any(|d| d == &lower) {
                return DirRole::Tutorial;
            }
            if self.example_dirs.iter().any(|d| d == &lower) {
                return DirRole::Example;
            }
            if self.skill_dirs.iter().any(|d| d == &lower) {
                return DirRole::Skill;
            }
        }
        DirRole::Source
    }

    /// Line cap for a documentation role; `None` for source (the source cap
    /// lives in [`Thresholds`])
    pub fn line_cap(&self, role: DirRole) -> Option<usize> {
        match role {
            DirRole::Reference => Some(self.reference_cap),
            DirRole::Tutorial => Some(self.tutorial_cap),
            DirRole::Example => Some(self.example_cap),
            DirRole::Skill => Some(self.skill_cap),
            DirRole::Source => None,
        }
    }
}

// ============================================================================
// Auto-approve policy
// ============================================================================

/// Findings at or below `max_risk_tier` with at least `min_confidence` skip
/// the interactive approval prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoApprovePolicy {
    /// Highest risk tier that may be auto-approved
    pub max_risk_tier: RiskTier,

    /// Minimum fused confidence required
    pub min_confidence: f64,
}

// ============================================================================
// Top-level config
// ============================================================================

/// Effective configuration for a scan or remediation session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Target analysis tier (1-3); demoted when tools are absent
    pub tier: u8,

    /// Collector focus; empty means all areas
    pub focus: Vec<FocusArea>,

    /// Repository root. Set programmatically, never from the file.
    #[serde(skip)]
    pub root: PathBuf,

    /// Globs protected from DELETE recommendations
    pub core_paths: Vec<String>,

    /// Globs omitted from every collector
    pub exclusions: Vec<String>,

    /// Collector thresholds
    pub thresholds: Thresholds,

    /// Optional auto-approve policy for remediation
    pub auto_approve: Option<AutoApprovePolicy>,

    /// Halt the session on the first verification failure
    pub abort_on_verify_failure: bool,

    /// Per-adapter subprocess timeout (seconds)
    pub tool_timeout_seconds: u64,

    /// Verifier invocation timeout (seconds)
    pub verifier_timeout_seconds: u64,

    /// Worker-pool size; 0 means logical CPU count
    pub concurrency: usize,

    /// Name for the VCS backup snapshot; default embeds a timestamp
    pub backup_namespace: Option<String>,

    /// Directory role conventions
    pub conventions: DirectoryConventions,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            tier: 2,
            focus: FocusArea::all(),
            root: PathBuf::from("."),
            core_paths: Vec::new(),
            exclusions: default_exclusions(),
            thresholds: Thresholds::default(),
            auto_approve: None,
            abort_on_verify_failure: false,
            tool_timeout_seconds: 120,
            verifier_timeout_seconds: 900,
            concurrency: 0,
            backup_namespace: None,
            conventions: DirectoryConventions::default(),
        }
    }
}

/// Path globs excluded from all collectors by default: build outputs,
/// generated code, vendored and environment directories.
fn default_exclusions() -> Vec<String> {
    [
        ".debloat/**",
        "target/**",
        "node_modules/**",
        "dist/**",
        "build/**",
        "vendor/**",
        "coverage/**",
        "__pycache__/**",
        ".venv/**",
        "venv/**",
        "*.min.js",
        "*.min.css",
        "*.lock",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl AuditConfig {
    /// Load configuration for a repository root. Reads `debloat.toml` when
    /// present; otherwise returns defaults rooted at `root`.
    pub fn load(root: &Path) -> Result<Self> {
        let config_path = root.join(CONFIG_FILE_NAME);
        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            toml::from_str(&contents).map_err(|e| AuditError::ConfigError {
                message: format!("{}: {}", config_path.display(), e),
            })?
        } else {
            Self::default()
        };
        config.root = root.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot honor
    fn validate(&self) -> Result<()> {
        if !(1..=3).contains(&self.tier) {
            return Err(AuditError::ConfigError {
                message: format!("tier must be 1-3, got {}", self.tier),
            });
        }
        if let Some(policy) = &self.auto_approve {
            if !(0.0..=1.0).contains(&policy.min_confidence) {
                return Err(AuditError::ConfigError {
                    message: format!(
                        "auto_approve.min_confidence must be in [0,1], got {}",
                        policy.min_confidence
                    ),
                });
            }
        }
        Ok(())
    }

    /// Focus areas in effect (empty focus means everything)
    pub fn has_focus(&self, area: FocusArea) -> bool {
        self.focus.is_empty() || self.focus.contains(&area)
    }

    /// Worker-pool size: `min(configured, logical CPUs)`, defaulting to the
    /// logical CPU count when unset.
    pub fn effective_concurrency(&self) -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        if self.concurrency == 0 {
            cpus
        } else {
            self.concurrency.min(cpus)
        }
    }

    /// Compiled core-path glob set
    pub fn core_globs(&self) -> Result<GlobSet> {
        build_globset(&self.core_paths)
    }

    /// Compiled exclusion glob set
    pub fn exclusion_globs(&self) -> Result<GlobSet> {
        build_globset(&self.exclusions)
    }

    /// Backup namespace, defaulting to a timestamped branch name
    pub fn backup_namespace_or_default(&self) -> String {
        match &self.backup_namespace {
            Some(ns) => ns.clone(),
            None => format!(
                "debloat/backup-{}",
                chrono::Utc::now().format("%Y%m%d-%H%M%S")
            ),
        }
    }

    /// FNV-1a digest of the effective configuration (root excluded), recorded
    /// in every report so reruns can be compared.
    pub fn digest(&self) -> String {
        // serde_json emits struct fields in declaration order, so the digest
        // input is canonical.
        let canonical = serde_json::to_string(self).unwrap_or_default();
        format!("{:016x}", fnv1a_hash(&canonical))
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| AuditError::ConfigError {
            message: format!("invalid glob '{}': {}", pattern, e),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| AuditError::ConfigError {
        message: format!("glob set: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuditConfig::default();
        assert_eq!(config.tier, 2);
        assert_eq!(config.tool_timeout_seconds, 120);
        assert_eq!(config.verifier_timeout_seconds, 900);
        assert!(!config.abort_on_verify_failure);
        assert!(config.exclusions.iter().any(|e| e.starts_with("target")));
    }

    #[test]
    fn test_partial_toml_overrides() {
        let toml_src = r#"
            tier = 1
            core_paths = ["src/auth/**"]

            [thresholds]
            god_structure_methods = 20
        "#;
        let config: AuditConfig = toml::from_str(toml_src).expect("parse");
        assert_eq!(config.tier, 1);
        assert_eq!(config.core_paths, vec!["src/auth/**"]);
        assert_eq!(config.thresholds.god_structure_methods, 20);
        // Untouched thresholds keep their defaults
        assert_eq!(config.thresholds.magic_literal_min_count, 3);
    }

    #[test]
    fn test_digest_is_stable_and_sensitive() {
        let a = AuditConfig::default();
        let b = AuditConfig::default();
        assert_eq!(a.digest(), b.digest());

        let mut c = AuditConfig::default();
        c.thresholds.source_file_lines = 999;
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn test_digest_ignores_root() {
        let mut a = AuditConfig::default();
        a.root = PathBuf::from("/somewhere");
        let mut b = AuditConfig::default();
        b.root = PathBuf::from("/elsewhere");
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_classify_directory_roles() {
        let conventions = DirectoryConventions::default();
        assert_eq!(
            conventions.classify("docs/reference/config.md"),
            DirRole::Reference
        );
        assert_eq!(
            conventions.classify("docs/tutorials/setup.md"),
            DirRole::Tutorial
        );
        assert_eq!(conventions.classify("demos/minimal.rs"), DirRole::Example);
        assert_eq!(conventions.classify("skills/deploy.md"), DirRole::Skill);
        assert_eq!(conventions.classify("src/main.rs"), DirRole::Source);
        // The file name alone never assigns a role
        assert_eq!(conventions.classify("reference.md"), DirRole::Source);
    }

    #[test]
    fn test_invalid_tier_rejected() {
        let mut config = AuditConfig::default();
        config.tier = 7;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_core_globs_match() {
        let mut config = AuditConfig::default();
        config.core_paths = vec!["src/auth/**".into()];
        let globs = config.core_globs().expect("globs");
        assert!(globs.is_match("src/auth/session.py"));
        assert!(!globs.is_match("src/api/handlers.py"));
    }

    #[test]
    fn test_effective_concurrency_capped() {
        let mut config = AuditConfig::default();
        config.concurrency = 100_000;
        let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        assert_eq!(config.effective_concurrency(), cpus);
    }
}
