//! Candidate review workflow: submitting a `needs_review` report as a
//! candidate, and applying a reviewer's decision.

use crate::directives::emit_directive;
use platform_core::{
    CandidateRecord, CandidateStatus, DirectiveCommand, PlatformError, PlatformResult, Report,
    ReviewDecision,
};
use platform_security::StateStore;
use std::path::{Path, PathBuf};

/// Composes a candidate from a `needs_review` report and writes it
/// atomically to `{candidates_dir}/<ts>_<candidate_id>.json`.
pub fn submit_candidate(candidates_dir: &Path, team: &str, report: &Report) -> PlatformResult<(CandidateRecord, PathBuf)> {
    let candidate_id = CandidateRecord::derive_id(&report.task_id);
    let record = CandidateRecord {
        candidate_id: candidate_id.clone(),
        task_id: report.task_id.clone(),
        agent: report.agent.clone(),
        team: team.to_string(),
        status: CandidateStatus::PendingReview,
        submitted_at: report.timestamp,
        reviewed_at: None,
        reviewer: None,
        notes: String::new(),
        review_reasons: report.review_reasons.clone(),
        risks: report.risks.clone(),
        proposed_changes: report.proposed_changes.clone(),
    };

    std::fs::create_dir_all(candidates_dir)?;
    let filename = format!("{}_{candidate_id}.json", report.timestamp.format("%Y%m%dT%H%M%S%.3fZ"));
    let path = candidates_dir.join(filename);
    StateStore::save(&path, &record)?;
    Ok((record, path))
}

/// Applies a `review_candidate` decision: loads the candidate file by id,
/// mutates status/reviewer/notes, rewrites it, and on approval emits an
/// `execute_approved_change` directive to the candidate's original agent.
pub fn review_candidate(
    candidates_dir: &Path,
    outbox_dir: &Path,
    controller_id: &str,
    candidate_id: &str,
    decision: ReviewDecision,
    reviewer: &str,
    notes: &str,
) -> PlatformResult<CandidateRecord> {
    let path = find_candidate_file(candidates_dir, candidate_id)
        .ok_or_else(|| PlatformError::Validation(format!("candidate '{candidate_id}' not found")))?;

    let raw = std::fs::read_to_string(&path)?;
    let mut record: CandidateRecord = serde_json::from_str(&raw)?;
    record.apply_decision(decision, reviewer, notes);
    StateStore::save(&path, &record)?;

    if matches!(decision, ReviewDecision::Approve) {
        let agent_dir = outbox_dir.join(&record.team).join(&record.agent);
        std::fs::create_dir_all(&agent_dir)?;
        let changes = record
            .proposed_changes
            .iter()
            .map(|c| serde_json::to_value(c).unwrap_or_default())
            .collect();
        emit_directive(
            &agent_dir,
            record.agent.clone(),
            DirectiveCommand::ExecuteApprovedChange {
                candidate_id: record.candidate_id.clone(),
                proposed_changes: changes,
            },
            controller_id.to_string(),
            "approved_directive",
        )?;
    }

    Ok(record)
}

fn find_candidate_file(candidates_dir: &Path, candidate_id: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(candidates_dir).ok()?;
    entries
        .flatten()
        .map(|e| e.path())
        .find(|p| p.file_name().and_then(|n| n.to_str()).map(|n| n.contains(candidate_id)).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use platform_core::{ProposedChange, Risk};
    use tempfile::tempdir;

    fn sample_report() -> Report {
        let (timestamp, local_timestamp) = Report::stamp_now();
        Report {
            agent: "sheets-agent".into(),
            timestamp,
            local_timestamp,
            task_id: "sh-clear-1".into(),
            status: platform_core::ReportStatus::NeedsReview,
            summary: "clear_range needs review".into(),
            metrics: Default::default(),
            artifacts: Vec::new(),
            next_actions: Vec::new(),
            proposed_changes: vec![ProposedChange {
                op: "clear_range".into(),
                target: serde_json::json!("A1:Z100"),
                old_values: None,
                new_values: None,
                explanation: "large clear".into(),
                confidence: 0.9,
                estimated_risk: Risk::High,
            }],
            validation: Vec::new(),
            risks: vec!["large range clear".into()],
            errors: Vec::new(),
            review_reasons: vec!["clear_range on A1:Z100: risk=high".into()],
        }
    }

    #[test]
    fn submit_then_approve_emits_one_directive() {
        let dir = tempdir().unwrap();
        let candidates_dir = dir.path().join("candidates");
        let outbox_dir = dir.path().join("outbox");

        let (record, path) = submit_candidate(&candidates_dir, "sheets-team", &sample_report()).unwrap();
        assert!(path.exists());
        assert_eq!(record.status, CandidateStatus::PendingReview);

        let approved = review_candidate(
            &candidates_dir,
            &outbox_dir,
            "controller-1",
            &record.candidate_id,
            ReviewDecision::Approve,
            "alice",
            "looks fine",
        )
        .unwrap();
        assert_eq!(approved.status, CandidateStatus::Approved);

        let agent_outbox = outbox_dir.join("sheets-team").join("sheets-agent");
        let files: Vec<_> = std::fs::read_dir(&agent_outbox).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn reject_emits_no_directive() {
        let dir = tempdir().unwrap();
        let candidates_dir = dir.path().join("candidates");
        let outbox_dir = dir.path().join("outbox");

        let (record, _) = submit_candidate(&candidates_dir, "sheets-team", &sample_report()).unwrap();
        review_candidate(
            &candidates_dir,
            &outbox_dir,
            "controller-1",
            &record.candidate_id,
            ReviewDecision::Reject,
            "alice",
            "too risky",
        )
        .unwrap();

        assert!(!outbox_dir.join("sheets-team").join("sheets-agent").exists());
    }

    #[test]
    fn reviewing_a_missing_candidate_fails() {
        let dir = tempdir().unwrap();
        let result = review_candidate(
            &dir.path().join("candidates"),
            &dir.path().join("outbox"),
            "controller-1",
            "cand-missing",
            ReviewDecision::Approve,
            "alice",
            "",
        );
        assert!(result.is_err());
    }
}
