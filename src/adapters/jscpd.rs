//! jscpd adapter: copy-paste block detection
//!
//! jscpd writes its JSON report to a directory rather than stdout; the
//! adapter points it at a temporary directory and reads the report back.

use std::collections::HashSet;
use std::process::Command;
use std::time::Duration;

use serde::Deserialize;

use super::{run_with_timeout, AdapterOutcome, ToolAdapter};
use crate::collectors::ScanContext;
use crate::error::Result;
use crate::schema::{Artifact, Evidence, EvidenceSource, ObservedValue, SignalKind};

const ADAPTER_VERSION: &str = "jscpd-adapter-1.0.0";

#[derive(Debug, Deserialize)]
struct JscpdReport {
    #[serde(default)]
    duplicates: Vec<JscpdDuplicate>,
}

#[derive(Debug, Deserialize)]
struct JscpdDuplicate {
    #[serde(rename = "firstFile")]
    first_file: JscpdFile,
    #[serde(rename = "secondFile")]
    second_file: JscpdFile,
    #[serde(default)]
    lines: usize,
}

#[derive(Debug, Deserialize)]
struct JscpdFile {
    name: String,
}

/// Duplicated-block adapter over `jscpd`
#[derive(Debug, Default)]
pub struct JscpdAdapter;

impl ToolAdapter for JscpdAdapter {
    fn name(&self) -> &'static str {
        "jscpd"
    }

    fn adapter_version(&self) -> &'static str {
        ADAPTER_VERSION
    }

    fn executable(&self) -> &'static str {
        "jscpd"
    }

    fn capabilities(&self) -> Vec<&'static str> {
        vec!["duplicated_block"]
    }

    fn analyze(&self, ctx: &ScanContext, artifacts: &[Artifact]) -> Result<AdapterOutcome> {
        let report_dir = std::env::temp_dir().join(format!(
            "debloat-jscpd-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&report_dir)?;

        let mut cmd = Command::new(self.executable());
        cmd.current_dir(ctx.root());
        cmd.args(["--reporters", "json", "--silent", "--output"]);
        cmd.arg(&report_dir);
        cmd.arg(".");

        let output = run_with_timeout(
            cmd,
            Duration::from_secs(ctx.config.tool_timeout_seconds),
        )?;

        let report_path = report_dir.join("jscpd-report.json");
        let report: Option<JscpdReport> = std::fs::read_to_string(&report_path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok());
        let _ = std::fs::remove_dir_all(&report_dir);

        let report = match report {
            Some(r) => r,
            None => {
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
        let evidence = normalize_duplicates(&report, &paths, output.timed_out);

        Ok(AdapterOutcome {
            evidence,
            partial: output.timed_out,
        })
    }
}

fn normalize_duplicates(
    report: &JscpdReport,
    known_paths: &HashSet<String>,
    partial: bool,
) -> Vec<Evidence> {
    let mut evidence = Vec::new();
    for duplicate in &report.duplicates {
        let weight = (duplicate.lines as f64 / 100.0).clamp(0.2, 1.0);
        for file in [&duplicate.first_file, &duplicate.second_file] {
            let relative = file.name.trim_start_matches("./").replace('\\', "/");
            if !known_paths.contains(&relative) {
                continue;
            }
            evidence.push(
                Evidence::new(
                    format!("file:{}", relative),
                    EvidenceSource::StaticAnalysis,
                    SignalKind::DuplicatedBlock,
                    weight,
                    0.75,
                    ADAPTER_VERSION,
                )
                .with_observed(ObservedValue::Count(duplicate.lines as u64))
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
    fn test_normalize_report() {
        let payload = r#"{
            "duplicates": [
                {
                    "firstFile": {"name": "src/a.js"},
                    "secondFile": {"name": "src/b.js"},
                    "lines": 40
                }
            ]
        }"#;
        let report: JscpdReport = serde_json::from_str(payload).unwrap();
        let paths: HashSet<String> = ["src/a.js", "src/b.js"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let evidence = normalize_duplicates(&report, &paths, false);
        assert_eq!(evidence.len(), 2);
        assert!((evidence[0].weight - 0.4).abs() < 1e-9);
        assert_eq!(evidence[0].signal_kind, SignalKind::DuplicatedBlock);
    }

    #[test]
    fn test_empty_report() {
        let report: JscpdReport = serde_json::from_str("{}").unwrap();
        assert!(normalize_duplicates(&report, &HashSet::new(), false).is_empty());
    }
}
