//! Report command handler

use chrono::Utc;

use crate::cli::{ReportArgs, ReportOperation};
use crate::commands::CommandContext;
use crate::error::Result;
use crate::remediate::prune_log;
use crate::report::ReportStore;

/// Run the report command
pub fn run_report(args: &ReportArgs, ctx: &CommandContext) -> Result<String> {
    let store = ReportStore::new(&ctx.root);
    match &args.operation {
        ReportOperation::List => {
            let stored = store.list()?;
            if stored.is_empty() {
                return Ok("no stored reports\n".to_string());
            }
            let mut output = String::from("timestamp             tier  findings  digest            path\n");
            for report in stored {
                output.push_str(&format!(
                    "{:<21} {:>4}  {:>8}  {}  {}\n",
                    report.scan_timestamp,
                    report.tier,
                    report.finding_count,
                    report.digest,
                    report.path.display()
                ));
            }
            Ok(output)
        }

        ReportOperation::Show { report } => {
            let loaded = store.read(report)?;
            let mut output = format!(
                "scan {} at {} (tier {}, commit {})\n\n",
                loaded.scan_id,
                loaded.scan_timestamp,
                loaded.tier,
                loaded.root_commit.as_deref().unwrap_or("n/a")
            );
            for finding in &loaded.findings {
                output.push_str(&format!(
                    "[{}] {} {} (score {}, confidence {:.2}, risk {}, ~{} tokens)\n    {}\n",
                    finding.severity.as_str(),
                    finding.recommendation.as_str(),
                    finding.artifact_path,
                    finding.bloat_score,
                    finding.confidence,
                    finding.risk_tier.as_str(),
                    finding.estimated_token_impact,
                    finding.rationale
                ));
            }
            Ok(output)
        }

        ReportOperation::Prune { older_than_days } => {
            let removed = store.prune(*older_than_days, Utc::now())?;
            Ok(format!("pruned {} report(s)\n", removed))
        }

        ReportOperation::PruneLog { older_than_days } => {
            let removed = prune_log(&ctx.root, *older_than_days, Utc::now())?;
            Ok(format!("pruned {} transaction log entr(ies)\n", removed))
        }
    }
}
