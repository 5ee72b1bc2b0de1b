//! Vulture adapter: Python dead-code detection
//!
//! Vulture reports findings with its own 60-100 confidence band; the adapter
//! rescales that band to 0-1 with `(raw - 50) / 50`, clamped.

use std::process::Command;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{run_with_timeout, AdapterOutcome, ToolAdapter};
use crate::collectors::ScanContext;
use crate::error::Result;
use crate::schema::{Artifact, Evidence, EvidenceSource, ObservedValue, SignalKind};

const ADAPTER_VERSION: &str = "vulture-adapter-1.1.0";

static FINDING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<file>.+?):(?P<line>\d+): unused (?P<kind>\w+) '(?P<name>[^']+)' \((?P<confidence>\d+)% confidence\)")
        .expect("vulture finding regex")
});

/// Dead-code adapter over `vulture`
#[derive(Debug, Default)]
pub struct VultureAdapter;

impl ToolAdapter for VultureAdapter {
    fn name(&self) -> &'static str {
        "vulture"
    }

    fn adapter_version(&self) -> &'static str {
        ADAPTER_VERSION
    }

    fn executable(&self) -> &'static str {
        "vulture"
    }

    fn capabilities(&self) -> Vec<&'static str> {
        vec!["unused_symbol", "unused_import"]
    }

    fn analyze(&self, ctx: &ScanContext, artifacts: &[Artifact]) -> Result<AdapterOutcome> {
        let has_python = artifacts.iter().any(|a| a.path.ends_with(".py"));
        if !has_python {
            return Ok(AdapterOutcome::default());
        }

        let mut cmd = Command::new(self.executable());
        cmd.current_dir(ctx.root());
        cmd.args(["--min-confidence", "60", "."]);

        let output = run_with_timeout(
            cmd,
            Duration::from_secs(ctx.config.tool_timeout_seconds),
        )?;

        // Vulture exits non-zero whenever it finds dead code; only an empty
        // stdout marks a genuinely failed run.
        if output.stdout.is_empty() && !output.timed_out {
            if output.exit_code != Some(0) {
                tracing::warn!(
                    tool = self.name(),
                    stderr = %output.stderr.trim(),
                    "tool produced no parsable output"
                );
            }
            return Ok(AdapterOutcome::default());
        }

        let paths = super::artifact_path_set(artifacts);
        let evidence = parse_vulture_output(&output.stdout, &paths, output.timed_out);

        Ok(AdapterOutcome {
            evidence,
            partial: output.timed_out,
        })
    }
}

fn parse_vulture_output(
    stdout: &str,
    known_paths: &std::collections::HashSet<String>,
    partial: bool,
) -> Vec<Evidence> {
    let mut evidence = Vec::new();
    for line in stdout.lines() {
        let caps = match FINDING_RE.captures(line) {
            Some(c) => c,
            None => continue,
        };
        let file = caps["file"].trim_start_matches("./").to_string();
        if !known_paths.contains(&file) {
            continue;
        }
        let raw_confidence: f64 = caps["confidence"].parse().unwrap_or(60.0);
        let confidence = ((raw_confidence - 50.0) / 50.0).clamp(0.0, 1.0);

        let signal_kind = match &caps["kind"] {
            "import" => SignalKind::UnusedImport,
            _ => SignalKind::UnusedSymbol,
        };

        evidence.push(
            Evidence::new(
                format!("file:{}", file),
                EvidenceSource::StaticAnalysis,
                signal_kind,
                0.8,
                confidence,
                ADAPTER_VERSION,
            )
            .with_observed(ObservedValue::Text(caps["name"].to_string()))
            .with_partial(partial),
        );
    }
    evidence
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn paths(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_and_rescale_confidence() {
        let stdout = "\
src/old_api.py:10: unused function 'fetch_legacy' (100% confidence)
src/old_api.py:40: unused class 'LegacyClient' (60% confidence)
src/app.py:3: unused import 'os' (90% confidence)
";
        let evidence = parse_vulture_output(
            stdout,
            &paths(&["src/old_api.py", "src/app.py"]),
            false,
        );
        assert_eq!(evidence.len(), 3);

        // 100% -> (100-50)/50 = 1.0
        assert_eq!(evidence[0].confidence, 1.0);
        assert_eq!(evidence[0].signal_kind, SignalKind::UnusedSymbol);
        // 60% -> 0.2
        assert!((evidence[1].confidence - 0.2).abs() < 1e-9);
        // Imports map to their own signal
        assert_eq!(evidence[2].signal_kind, SignalKind::UnusedImport);
    }

    #[test]
    fn test_unknown_paths_dropped() {
        let stdout = "vendored/lib.py:1: unused function 'x' (90% confidence)\n";
        let evidence = parse_vulture_output(stdout, &paths(&["src/app.py"]), false);
        assert!(evidence.is_empty());
    }

    #[test]
    fn test_partial_flag_propagates() {
        let stdout = "src/a.py:1: unused function 'f' (80% confidence)\n";
        let evidence = parse_vulture_output(stdout, &paths(&["src/a.py"]), true);
        assert!(evidence[0].partial);
    }

    #[test]
    fn test_garbage_lines_ignored() {
        let stdout = "not a finding\nsrc/a.py: malformed\n";
        let evidence = parse_vulture_output(stdout, &paths(&["src/a.py"]), false);
        assert!(evidence.is_empty());
    }
}
