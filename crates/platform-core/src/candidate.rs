use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::report::{ProposedChange, Risk};

/// Disposition of a candidate awaiting human review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    PendingReview,
    Approved,
    Rejected,
}

/// A decision submitted against a pending candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

/// A proposed change awaiting human approval, created from a report whose
/// status was `needs_review`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub candidate_id: String,
    pub task_id: String,
    pub agent: String,
    pub team: String,
    pub status: CandidateStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<String>,
    #[serde(default)]
    pub notes: String,
    pub review_reasons: Vec<String>,
    pub risks: Vec<String>,
    pub proposed_changes: Vec<ProposedChange>,
}

impl CandidateRecord {
    /// Derives a candidate id from the originating task id.
    pub fn derive_id(task_id: &str) -> String {
        format!("cand-{task_id}")
    }

    /// Applies a reviewer's decision, mutating status/reviewer/notes in place.
    pub fn apply_decision(
        &mut self,
        decision: ReviewDecision,
        reviewer: impl Into<String>,
        notes: impl Into<String>,
    ) {
        self.status = match decision {
            ReviewDecision::Approve => CandidateStatus::Approved,
            ReviewDecision::Reject => CandidateStatus::Rejected,
        };
        self.reviewer = Some(reviewer.into());
        self.notes = notes.into();
        self.reviewed_at = Some(Utc::now());
    }

    /// True if any copied proposed change is high risk — useful for
    /// operator-facing summaries.
    pub fn has_high_risk_change(&self) -> bool {
        self.proposed_changes
            .iter()
            .any(|c| c.estimated_risk == Risk::High)
    }
}
