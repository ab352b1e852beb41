use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Risk classification attached to a proposed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Low,
    Medium,
    High,
}

/// Outcome status of one agent invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Success,
    /// Controller-side alias accepted alongside `Error` on the wire; agents
    /// emit `Error`, upstream report producers may still emit `Failure`.
    Failure,
    Error,
    Partial,
    NeedsReview,
}

/// Runtime metrics attached to a report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportMetrics {
    pub duration_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_out: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_eur: Option<f64>,
}

/// One proposed change inside a report, carrying its own risk and confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedChange {
    pub op: String,
    pub target: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_values: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_values: Option<serde_json::Value>,
    pub explanation: String,
    pub confidence: f64,
    pub estimated_risk: Risk,
}

/// One entry confirming (or denying) that a required field was present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationEntry {
    pub field: String,
    pub ok: bool,
    #[serde(default)]
    pub notes: String,
}

/// The structured output of one agent invocation for one task.
///
/// Invariants (enforced by [`Report::new_success`] / construction helpers,
/// not by serde): `status == NeedsReview` implies `review_reasons` is
/// non-empty; `status == Success` implies `errors` is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub agent: String,
    pub timestamp: DateTime<Utc>,
    /// Local-time rendering of `timestamp` for human-facing summaries.
    /// Not part of the external report contract, so incoming reports
    /// that omit it deserialize with an empty string rather than failing.
    #[serde(default)]
    pub local_timestamp: String,
    pub task_id: String,
    pub status: ReportStatus,
    pub summary: String,
    pub metrics: ReportMetrics,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub next_actions: Vec<String>,
    #[serde(default)]
    pub proposed_changes: Vec<ProposedChange>,
    #[serde(default)]
    pub validation: Vec<ValidationEntry>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub review_reasons: Vec<String>,
}

impl Report {
    /// Stamps the current instant as both UTC and a local-time rendering.
    pub fn stamp_now() -> (DateTime<Utc>, String) {
        let utc = Utc::now();
        (utc, chrono::Local::now().to_rfc3339())
    }

    /// Classifies this report's outcome as needs-review when any proposed
    /// change is high-risk or under-confident.
    pub fn classify_status(changes: &[ProposedChange]) -> (ReportStatus, Vec<String>) {
        const CONFIDENCE_THRESHOLD: f64 = 0.85;
        let mut reasons = Vec::new();
        for change in changes {
            if change.estimated_risk == Risk::High {
                reasons.push(format!(
                    "{} on {}: risk=high",
                    change.op,
                    change.target
                ));
            } else if change.confidence < CONFIDENCE_THRESHOLD {
                reasons.push(format!(
                    "{} on {}: confidence={}",
                    change.op, change.target, change.confidence
                ));
            }
        }
        if reasons.is_empty() {
            (ReportStatus::Success, reasons)
        } else {
            (ReportStatus::NeedsReview, reasons)
        }
    }
}
