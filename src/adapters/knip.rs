//! Knip adapter: tree-shakeable dead files and exports in JS/TS projects

use std::collections::HashSet;
use std::process::Command;
use std::time::Duration;

use serde::Deserialize;

use super::{run_with_timeout, AdapterOutcome, ToolAdapter};
use crate::collectors::ScanContext;
use crate::error::Result;
use crate::schema::{Artifact, Evidence, EvidenceSource, ObservedValue, SignalKind};

const ADAPTER_VERSION: &str = "knip-adapter-1.0.0";

#[derive(Debug, Deserialize)]
struct KnipReport {
    #[serde(default)]
    files: Vec<String>,
    #[serde(default)]
    issues: Vec<KnipIssue>,
}

#[derive(Debug, Deserialize)]
struct KnipIssue {
    file: String,
    #[serde(default)]
    exports: Vec<KnipExport>,
}

#[derive(Debug, Deserialize)]
struct KnipExport {
    name: String,
}

/// Unreachable-module adapter over `knip`
#[derive(Debug, Default)]
pub struct KnipAdapter;

impl ToolAdapter for KnipAdapter {
    fn name(&self) -> &'static str {
        "knip"
    }

    fn adapter_version(&self) -> &'static str {
        ADAPTER_VERSION
    }

    fn executable(&self) -> &'static str {
        "knip"
    }

    fn capabilities(&self) -> Vec<&'static str> {
        vec!["tree_shakeable_dead", "unused_symbol"]
    }

    fn analyze(&self, ctx: &ScanContext, artifacts: &[Artifact]) -> Result<AdapterOutcome> {
        let has_js = artifacts.iter().any(|a| {
            a.path.ends_with(".js")
                || a.path.ends_with(".jsx")
                || a.path.ends_with(".ts")
                || a.path.ends_with(".tsx")
        });
        if !has_js || !ctx.root().join("package.json").exists() {
            return Ok(AdapterOutcome::default());
        }

        let mut cmd = Command::new(self.executable());
        cmd.current_dir(ctx.root());
        cmd.args(["--reporter", "json", "--no-exit-code"]);

        let output = run_with_timeout(
            cmd,
            Duration::from_secs(ctx.config.tool_timeout_seconds),
        )?;

        let report: KnipReport = match serde_json::from_str(&output.stdout) {
            Ok(r) => r,
            Err(_) => {
                if !output.timed_out && output.exit_code != Some(0) {
                    tracing::warn!(
                        tool = self.name(),
                        stderr = %output.stderr.trim(),
                        "tool produced no parsable output"
                    );
                }
                return Ok(AdapterOutcome {
                    evidence: Vec::new(),
                    partial: output.timed_out,
                });
            }
        };

        let paths = super::artifact_path_set(artifacts);
        let evidence = normalize_report(&report, &paths, output.timed_out);

        Ok(AdapterOutcome {
            evidence,
            partial: output.timed_out,
        })
    }
}

fn normalize_report(
    report: &KnipReport,
    known_paths: &HashSet<String>,
    partial: bool,
) -> Vec<Evidence> {
    let mut evidence = Vec::new();

    // Whole files unreachable from any entry point
    for file in &report.files {
        let relative = file.trim_start_matches("./").replace('\\', "/");
        if !known_paths.contains(&relative) {
            continue;
        }
        evidence.push(
            Evidence::new(
                format!("file:{}", relative),
                EvidenceSource::StaticAnalysis,
                SignalKind::TreeShakeableDead,
                0.85,
                0.8,
                ADAPTER_VERSION,
            )
            .with_partial(partial),
        );
    }

    // Individual dead exports
    for issue in &report.issues {
        let relative = issue.file.trim_start_matches("./").replace('\\', "/");
        if !known_paths.contains(&relative) {
            continue;
        }
        for export in &issue.exports {
            evidence.push(
                Evidence::new(
                    format!("file:{}", relative),
                    EvidenceSource::StaticAnalysis,
                    SignalKind::UnusedSymbol,
                    0.6,
                    0.75,
                    ADAPTER_VERSION,
                )
                .with_observed(ObservedValue::Text(export.name.clone()))
                .with_partial(partial),
            );
        }
    }
    evidence
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_files_and_exports() {
        let payload = r#"{
            "files": ["src/dead.ts"],
            "issues": [
                {"file": "src/lib.ts", "exports": [{"name": "unusedHelper", "line": 4, "col": 1}]}
            ]
        }"#;
        let report: KnipReport = serde_json::from_str(payload).unwrap();
        let paths: HashSet<String> = ["src/dead.ts", "src/lib.ts"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let evidence = normalize_report(&report, &paths, false);
        assert_eq!(evidence.len(), 2);
        assert_eq!(evidence[0].signal_kind, SignalKind::TreeShakeableDead);
        assert_eq!(evidence[1].signal_kind, SignalKind::UnusedSymbol);
    }
}
