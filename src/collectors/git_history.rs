//! Git history collector: staleness, churn, author dispersion, orphans
//!
//! Works entirely off the per-file statistics gathered by one log pass.
//! Without a VCS this collector emits nothing and the scan records it as
//! unavailable.

use std::sync::mpsc;

use super::{Collector, ScanContext};
use crate::config::AuditConfig;
use crate::error::Result;
use crate::schema::{
    Artifact, ArtifactKind, Evidence, EvidenceSource, FocusArea, ObservedValue, SignalKind,
};

const DETECTOR_VERSION: &str = "git-history-1.1.0";

/// Git-derived abandonment signals
#[derive(Debug, Default)]
pub struct GitHistoryCollector;

impl GitHistoryCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Collector for GitHistoryCollector {
    fn name(&self) -> &'static str {
        "git_history"
    }

    fn source(&self) -> EvidenceSource {
        EvidenceSource::GitHistory
    }

    fn enabled(&self, config: &AuditConfig) -> bool {
        config.has_focus(FocusArea::Git)
    }

    fn collect(
        &self,
        ctx: &ScanContext,
        artifacts: &[Artifact],
        tx: &mpsc::Sender<Evidence>,
    ) -> Result<()> {
        let stats = match &ctx.git_stats {
            Some(s) => s,
            None => return Ok(()),
        };
        let thresholds = &ctx.config.thresholds;

        for artifact in artifacts {
            ctx.check_cancelled()?;
            if artifact.kind == ArtifactKind::Dependency {
                continue;
            }
            let file_stats = match stats.get(&artifact.path) {
                Some(s) => s,
                None => continue,
            };

            let days = file_stats.days_since_last_commit(ctx.now);
            let churn = file_stats.commits_in_window;

            // Orphan: added in one commit, never touched again, at least a
            // year old. Stronger than the graded staleness ramp.
            if file_stats.added_never_modified && days >= thresholds.orphan_age_days {
                tx.send(
                    Evidence::new(
                        artifact.id(),
                        EvidenceSource::GitHistory,
                        SignalKind::Stale,
                        0.9,
                        0.9,
                        DETECTOR_VERSION,
                    )
                    .with_observed(ObservedValue::Days(days)),
                )
                .ok();
                continue;
            }

            // Graded staleness, suppressed by recent churn
            let ramp = (days - thresholds.stale_after_days) as f64
                / thresholds.stale_ramp_days as f64;
            let suppression =
                1.0 - (churn as f64 / thresholds.churn_saturation as f64).min(1.0);
            let weight = ramp.clamp(0.0, 1.0) * suppression;

            if weight > 0.0 {
                tx.send(
                    Evidence::new(
                        artifact.id(),
                        EvidenceSource::GitHistory,
                        SignalKind::Stale,
                        weight,
                        0.85,
                        DETECTOR_VERSION,
                    )
                    .with_observed(ObservedValue::Days(days)),
                )
                .ok();

                // Single-author staleness corroborates abandonment as a
                // supplementary item, not a heavier weight.
                if file_stats.author_count == 1 && weight > 0.5 {
                    tx.send(
                        Evidence::new(
                            artifact.id(),
                            EvidenceSource::GitHistory,
                            SignalKind::AuthorConcentration,
                            0.3,
                            0.7,
                            DETECTOR_VERSION,
                        )
                        .with_observed(ObservedValue::Count(file_stats.author_count as u64)),
                    )
                    .ok();
                }
            }
        }
        Ok(())
    }
}
