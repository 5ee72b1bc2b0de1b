//! Lizard adapter: cyclomatic complexity across languages
//!
//! Parses `lizard --csv` rows and flags functions whose cyclomatic
//! complexity exceeds the configured threshold.

use std::collections::HashSet;
use std::process::Command;
use std::time::Duration;

use super::{run_with_timeout, AdapterOutcome, ToolAdapter};
use crate::collectors::ScanContext;
use crate::error::Result;
use crate::schema::{Artifact, Evidence, EvidenceSource, ObservedValue, SignalKind};

const ADAPTER_VERSION: &str = "lizard-adapter-1.0.1";

/// Complexity adapter over `lizard`
#[derive(Debug, Default)]
pub struct LizardAdapter;

impl ToolAdapter for LizardAdapter {
    fn name(&self) -> &'static str {
        "lizard"
    }

    fn adapter_version(&self) -> &'static str {
        ADAPTER_VERSION
    }

    fn executable(&self) -> &'static str {
        "lizard"
    }

    fn capabilities(&self) -> Vec<&'static str> {
        vec!["cyclomatic_complexity_high"]
    }

    fn analyze(&self, ctx: &ScanContext, artifacts: &[Artifact]) -> Result<AdapterOutcome> {
        let mut cmd = Command::new(self.executable());
        cmd.current_dir(ctx.root());
        cmd.args(["--csv", "."]);

        let output = run_with_timeout(
            cmd,
            Duration::from_secs(ctx.config.tool_timeout_seconds),
        )?;

        if output.stdout.is_empty() {
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

        let paths = super::artifact_path_set(artifacts);
        let evidence = parse_lizard_csv(
            &output.stdout,
            &paths,
            ctx.config.thresholds.complexity_threshold,
            output.timed_out,
        );

        Ok(AdapterOutcome {
            evidence,
            partial: output.timed_out,
        })
    }
}

/// Split one CSV row, honoring double quotes
fn split_csv_row(row: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in row.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(current.clone());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

/// Row layout: NLOC, CCN, tokens, params, length, location, file, function, ...
fn parse_lizard_csv(
    stdout: &str,
    known_paths: &HashSet<String>,
    ccn_threshold: usize,
    partial: bool,
) -> Vec<Evidence> {
    let mut evidence = Vec::new();
    for row in stdout.lines() {
        let fields = split_csv_row(row);
        if fields.len() < 8 {
            continue;
        }
        let ccn: usize = match fields[1].trim().parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        if ccn <= ccn_threshold {
            continue;
        }

        let file = fields[6].trim().trim_start_matches("./").replace('\\', "/");
        if !known_paths.contains(&file) {
            continue;
        }
        let function = fields[7].trim().to_string();

        let weight = ((ccn - ccn_threshold) as f64 / ccn_threshold as f64).clamp(0.1, 1.0);
        evidence.push(
            Evidence::new(
                format!("file:{}", file),
                EvidenceSource::StaticAnalysis,
                SignalKind::CyclomaticComplexityHigh,
                weight,
                0.8,
                ADAPTER_VERSION,
            )
            .with_observed(ObservedValue::Text(format!("{} ccn={}", function, ccn)))
            .with_partial(partial),
        );
    }
    evidence
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_rows_over_threshold() {
        let stdout = "\
89,31,654,4,95,\"process@12-107@./src/engine.py\",\"./src/engine.py\",\"process\",\"process( self )\",12,107
10,3,80,1,12,\"tiny@1-12@./src/util.py\",\"./src/util.py\",\"tiny\",\"tiny( x )\",1,12
";
        let evidence = parse_lizard_csv(stdout, &paths(&["src/engine.py", "src/util.py"]), 15, false);
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].artifact_id, "file:src/engine.py");
        assert_eq!(
            evidence[0].signal_kind,
            SignalKind::CyclomaticComplexityHigh
        );
        // (31 - 15) / 15, clamped
        assert!((evidence[0].weight - (16.0 / 15.0f64).clamp(0.1, 1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_quoted_commas_survive() {
        let fields = split_csv_row("1,2,3,\"a, b\",c");
        assert_eq!(fields, vec!["1", "2", "3", "a, b", "c"]);
    }

    #[test]
    fn test_malformed_rows_skipped() {
        let evidence = parse_lizard_csv("garbage\n1,2\n", &paths(&["src/a.py"]), 15, false);
        assert!(evidence.is_empty());
    }
}
