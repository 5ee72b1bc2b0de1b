//! Remediate command handler
//!
//! Hosts the executor's decision callback with an interactive prompt.
//! `--yes` substitutes the approve-everything policy for scripted use.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use dialoguer::Select;

use crate::cli::RemediateArgs;
use crate::commands::CommandContext;
use crate::config::AuditConfig;
use crate::error::{AuditError, Result};
use crate::remediate::{
    action_preview, execute_session, ApproveAll, Decision, DecisionCallback, ExecutorOptions,
    SessionSummary, TxOutcome,
};
use crate::report::ReportStore;
use crate::schema::Finding;
use crate::verify::DefaultVerifier;

/// Run the remediate command
pub fn run_remediate(args: &RemediateArgs, ctx: &CommandContext) -> Result<String> {
    let config = AuditConfig::load(&ctx.root)?;
    let store = ReportStore::new(&ctx.root);

    let report_path = match &args.report {
        Some(path) => path.clone(),
        None => latest_report(&store)?,
    };
    let report = store.read(&report_path)?;

    let verifier = DefaultVerifier::new(config.verifier_timeout_seconds);
    let options = ExecutorOptions {
        dry_run: args.dry_run,
        resume: args.resume,
    };
    let cancel = Arc::new(AtomicBool::new(false));

    let summary = if args.yes {
        let mut callback = ApproveAll;
        execute_session(&config, &report, &verifier, &mut callback, cancel, &options)?
    } else {
        let mut callback = InteractivePrompt;
        execute_session(&config, &report, &verifier, &mut callback, cancel, &options)?
    };

    Ok(render_summary(&summary))
}

fn latest_report(store: &ReportStore) -> Result<PathBuf> {
    store
        .list()?
        .into_iter()
        .next()
        .map(|stored| stored.path)
        .ok_or_else(|| AuditError::ReportError {
            message: "no stored reports; run `debloat-engine scan` first".to_string(),
        })
}

fn render_summary(summary: &SessionSummary) -> String {
    let mut output = String::new();
    for tx in &summary.transactions {
        let verifier = tx
            .verifier
            .map(|v| format!(" verifier={}", v.as_str()))
            .unwrap_or_default();
        output.push_str(&format!(
            "{:<18} {:<11} {}{}\n",
            outcome_label(tx.outcome),
            tx.action.as_str(),
            tx.artifact_path,
            verifier
        ));
    }
    let applied = summary
        .transactions
        .iter()
        .filter(|t| t.outcome == TxOutcome::Applied)
        .count();
    output.push_str(&format!(
        "\n{} applied, {} total; backup branch: {}\n",
        applied,
        summary.transactions.len(),
        summary.backup_branch
    ));
    if summary.halted_early {
        output.push_str("session halted early; rerun with --resume to continue\n");
    }
    output
}

fn outcome_label(outcome: TxOutcome) -> &'static str {
    match outcome {
        TxOutcome::Applied => "applied",
        TxOutcome::RolledBack => "rolled back",
        TxOutcome::Aborted => "aborted",
        TxOutcome::SkippedByOperator => "skipped",
        TxOutcome::SkippedStale => "skipped (stale)",
        TxOutcome::RequiresManual => "manual action",
        TxOutcome::DryRun => "dry run",
    }
}

/// Interactive operator prompt over stdin/stdout
struct InteractivePrompt;

impl DecisionCallback for InteractivePrompt {
    fn request_decision(&mut self, finding: &Finding) -> Decision {
        println!(
            "\n[{}] {} {} (score {}, confidence {:.2}, risk {})",
            finding.severity.as_str(),
            finding.recommendation.as_str(),
            finding.artifact_path,
            finding.bloat_score,
            finding.confidence,
            finding.risk_tier.as_str()
        );
        println!("  {}", finding.rationale);

        let choices = [
            "approve",
            "approve all of this tier",
            "inspect diff",
            "skip",
            "abort session",
        ];
        let picked = Select::new()
            .with_prompt("decision")
            .items(&choices)
            .default(0)
            .interact();

        match picked {
            Ok(0) => Decision::Approve,
            Ok(1) => Decision::ApproveAllOfTier,
            Ok(2) => {
                println!("{}", action_preview(finding));
                Decision::InspectDiff
            }
            Ok(3) => Decision::Skip,
            Ok(_) => Decision::Abort,
            Err(_) => {
                // No usable terminal: refuse rather than assume approval
                eprintln!("no interactive terminal; aborting (use --yes for scripted runs)");
                Decision::Abort
            }
        }
    }
}
