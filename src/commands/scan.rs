//! Scan command handler

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::cli::ScanArgs;
use crate::commands::CommandContext;
use crate::config::AuditConfig;
use crate::error::{AuditError, Result};
use crate::scan::run_scan_and_store;
use crate::schema::{Finding, FocusArea};

/// How many findings the default summary shows
const SUMMARY_LIMIT: usize = 20;

/// Run the scan command
pub fn run_scan_command(args: &ScanArgs, ctx: &CommandContext) -> Result<String> {
    let mut config = AuditConfig::load(&ctx.root)?;
    if let Some(tier) = args.tier {
        config.tier = tier;
    }
    if !args.focus.is_empty() {
        config.focus = parse_focus(&args.focus)?;
    }

    let outcome = run_scan_and_store(config, Arc::new(AtomicBool::new(false)))?;
    let report = &outcome.report;

    let mut output = String::new();
    output.push_str(&format!(
        "scan {} (tier {}, {} findings)\n",
        report.scan_id,
        report.tier,
        report.findings.len()
    ));
    output.push_str(&format!(
        "report: {} (digest {})\n\n",
        outcome.report_path.display(),
        outcome.digest
    ));

    let shown = if args.full {
        report.findings.len()
    } else {
        report.findings.len().min(SUMMARY_LIMIT)
    };
    if shown > 0 {
        output.push_str("score  conf  sev   risk  action       artifact\n");
    }
    for finding in report.findings.iter().take(shown) {
        output.push_str(&render_row(finding));
    }
    if shown < report.findings.len() {
        output.push_str(&format!(
            "... {} more (use --full or `report show`)\n",
            report.findings.len() - shown
        ));
    }

    if ctx.verbose {
        output.push('\n');
        for (name, status) in &report.tool_availability {
            output.push_str(&format!(
                "tool {}: {}{}\n",
                name,
                if status.available { "available" } else { "absent" },
                status
                    .reason
                    .as_ref()
                    .map(|r| format!(" ({})", r))
                    .unwrap_or_default()
            ));
        }
    }

    Ok(output)
}

fn render_row(finding: &Finding) -> String {
    format!(
        "{:>5}  {:.2}  {:<4}  {:<4}  {:<11}  {}\n",
        finding.bloat_score,
        finding.confidence,
        finding.severity.as_str(),
        finding.risk_tier.as_str(),
        finding.recommendation.as_str(),
        finding.artifact_path
    )
}

fn parse_focus(raw: &[String]) -> Result<Vec<FocusArea>> {
    raw.iter()
        .map(|item| match item.trim().to_lowercase().as_str() {
            "code" => Ok(FocusArea::Code),
            "docs" => Ok(FocusArea::Docs),
            "dependencies" | "deps" => Ok(FocusArea::Dependencies),
            "git" => Ok(FocusArea::Git),
            other => Err(AuditError::ConfigError {
                message: format!(
                    "unknown focus area '{}' (expected code, docs, dependencies, git)",
                    other
                ),
            }),
        })
        .collect()
}
