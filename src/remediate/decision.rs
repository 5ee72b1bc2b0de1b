//! Operator decision contract
//!
//! The executor exposes a single synchronous callback; hosts surface it
//! however they like (interactive prompt, scripted policy, CI rules). The
//! core imposes no prompt format.

use std::collections::VecDeque;

use crate::schema::Finding;

/// Operator response for one finding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Apply this finding
    Approve,
    /// Apply this finding and everything else at its risk tier
    ApproveAllOfTier,
    /// Show the pending change, then ask again
    InspectDiff,
    /// Skip this finding
    Skip,
    /// Halt the session after the current transaction
    Abort,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::ApproveAllOfTier => "approve_all_of_tier",
            Self::InspectDiff => "inspect_diff",
            Self::Skip => "skip",
            Self::Abort => "abort",
        }
    }
}

/// Host-supplied approval hook, synchronous with the current transaction
pub trait DecisionCallback {
    fn request_decision(&mut self, finding: &Finding) -> Decision;
}

/// Policy that approves everything; for scripted runs and tests
#[derive(Debug, Default)]
pub struct ApproveAll;

impl DecisionCallback for ApproveAll {
    fn request_decision(&mut self, _finding: &Finding) -> Decision {
        Decision::Approve
    }
}

/// Fixed decision sequence; once drained everything is skipped
#[derive(Debug, Default)]
pub struct ScriptedDecisions {
    queue: VecDeque<Decision>,
}

impl ScriptedDecisions {
    pub fn new(decisions: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            queue: decisions.into_iter().collect(),
        }
    }
}

impl DecisionCallback for ScriptedDecisions {
    fn request_decision(&mut self, _finding: &Finding) -> Decision {
        self.queue.pop_front().unwrap_or(Decision::Skip)
    }
}
