//! Ruff adapter: unused imports and bindings in Python
//!
//! Runs `ruff check` with JSON diagnostics restricted to the pyflakes
//! unused-code rules and maps each diagnostic onto the owning artifact.

use std::process::Command;
use std::time::Duration;

use serde::Deserialize;

use super::{run_with_timeout, AdapterOutcome, ToolAdapter};
use crate::collectors::ScanContext;
use crate::error::Result;
use crate::schema::{Artifact, Evidence, EvidenceSource, ObservedValue, SignalKind};

const ADAPTER_VERSION: &str = "ruff-adapter-1.0.3";

#[derive(Debug, Deserialize)]
struct RuffDiagnostic {
    code: Option<String>,
    filename: String,
    message: String,
}

/// Unused-import adapter over `ruff check`
#[derive(Debug, Default)]
pub struct RuffAdapter;

impl ToolAdapter for RuffAdapter {
    fn name(&self) -> &'static str {
        "ruff"
    }

    fn adapter_version(&self) -> &'static str {
        ADAPTER_VERSION
    }

    fn executable(&self) -> &'static str {
        "ruff"
    }

    fn capabilities(&self) -> Vec<&'static str> {
        vec!["unused_import"]
    }

    fn analyze(&self, ctx: &ScanContext, artifacts: &[Artifact]) -> Result<AdapterOutcome> {
        let has_python = artifacts.iter().any(|a| a.path.ends_with(".py"));
        if !has_python {
            return Ok(AdapterOutcome::default());
        }

        let mut cmd = Command::new(self.executable());
        cmd.current_dir(ctx.root());
        cmd.args([
            "check",
            "--output-format",
            "json",
            "--select",
            "F401,F811,F841",
            "--no-cache",
            ".",
        ]);

        let output = run_with_timeout(
            cmd,
            Duration::from_secs(ctx.config.tool_timeout_seconds),
        )?;

        let diagnostics: Vec<RuffDiagnostic> = match serde_json::from_str(&output.stdout) {
            Ok(d) => d,
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

        let root = ctx.root().to_path_buf();
        let paths = super::artifact_path_set(artifacts);
        let mut evidence = Vec::new();

        for diag in diagnostics {
            let relative = diag
                .filename
                .strip_prefix(&format!("{}/", root.display()))
                .unwrap_or(&diag.filename)
                .trim_start_matches("./")
                .replace('\\', "/");
            if !paths.contains(&relative) {
                continue;
            }

            let signal_kind = match diag.code.as_deref() {
                Some("F401") | Some("F811") => SignalKind::UnusedImport,
                _ => SignalKind::UnusedSymbol,
            };

            evidence.push(
                Evidence::new(
                    format!("file:{}", relative),
                    EvidenceSource::StaticAnalysis,
                    signal_kind,
                    0.6,
                    0.85,
                    ADAPTER_VERSION,
                )
                .with_observed(ObservedValue::Text(diag.message))
                .with_partial(output.timed_out),
            );
        }

        Ok(AdapterOutcome {
            evidence,
            partial: output.timed_out,
        })
    }
}
