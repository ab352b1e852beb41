//! End-to-end Controller cycles exercising the scenarios in the testable
//! properties: happy path, error-then-retry, escalation after exhaustion,
//! needs-review approval, and tampered-report detection.

use controller::{ControllerConfig, ControllerEngine};
use serde_json::{json, Value};
use std::path::Path;

fn write_report(config: &ControllerConfig, team: &str, agent: &str, name: &str, body: &Value) -> std::path::PathBuf {
    let dir = config.inbox_dir().join(team).join(agent);
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, body.to_string()).unwrap();
    path
}

fn report(task_id: &str, status: &str, summary: &str) -> Value {
    json!({
        "agent": "sheets-agent",
        "timestamp": "2026-02-24T10:33:00Z",
        "task_id": task_id,
        "status": status,
        "summary": summary,
        "metrics": {"duration_ms": 820}
    })
}

#[tokio::test]
async fn happy_path_archives_the_report_and_writes_a_self_report() {
    let dir = tempfile::tempdir().unwrap();
    let config = ControllerConfig::new("controller-1", dir.path());
    let engine = ControllerEngine::new(config.clone());

    write_report(&config, "sheets-team", "sheets-agent", "20260224T103300Z_report.json", &report("sh-042", "success", "Cell B5 updated"));

    let summary = engine.process_inbox(None).await.unwrap();
    assert_eq!(summary.processed.len(), 1);
    assert_eq!(summary.processed[0].outcome, "recorded_success");
    assert!(summary.self_report_path.is_some());

    let processed = config.inbox_dir().join("sheets-team").join("sheets-agent").join("20260224T103300Z_report.processed.json");
    assert!(processed.exists());

    let retry_state = config.retry_state_path();
    if retry_state.exists() {
        let content = std::fs::read_to_string(&retry_state).unwrap();
        assert!(!content.contains("sh-042"));
    }
}

#[tokio::test]
async fn error_then_retry_emits_a_first_retry_directive() {
    let dir = tempfile::tempdir().unwrap();
    let config = ControllerConfig::new("controller-1", dir.path());
    let engine = ControllerEngine::new(config.clone());

    write_report(&config, "sheets-team", "sheets-agent", "20260224T103300Z_report.json", &report("sh-err-001", "error", "could not reach sheets API"));

    engine.process_inbox(None).await.unwrap();

    let retry_state = std::fs::read_to_string(config.retry_state_path()).unwrap();
    assert!(retry_state.contains("sh-err-001"));
    assert!(retry_state.contains("\"retry_count\": 1"));

    let outbox = config.outbox_dir().join("sheets-team").join("sheets-agent");
    let retry_files: Vec<_> = std::fs::read_dir(&outbox)
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().ends_with("_retry_directive.json"))
        .collect();
    assert_eq!(retry_files.len(), 1);

    let content = std::fs::read_to_string(retry_files[0].path()).unwrap();
    assert!(content.contains("\"command\": \"retry_task\""));
    assert!(content.contains("sh-err-001"));
}

#[tokio::test]
async fn four_failures_with_max_three_retries_escalates() {
    let dir = tempfile::tempdir().unwrap();
    let config = ControllerConfig::new("controller-1", dir.path());
    let engine = ControllerEngine::new(config.clone());

    for i in 0..4 {
        write_report(
            &config,
            "sheets-team",
            "sheets-agent",
            &format!("2026022{i}T103300Z_report.json"),
            &report("sh-flaky-1", "error", "transient failure"),
        );
        engine.process_inbox(None).await.unwrap();
    }

    let retry_state = std::fs::read_to_string(config.retry_state_path()).unwrap();
    assert!(retry_state.contains("\"exhausted\""));

    let escalation_files: Vec<_> = std::fs::read_dir(config.escalation_dir())
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().ends_with("_escalation.json"))
        .collect();
    assert!(!escalation_files.is_empty());

    let content = std::fs::read_to_string(escalation_files[0].path()).unwrap();
    assert!(content.contains("\"command\": \"escalate\""));
    assert!(content.contains("max retries"));
}

#[tokio::test]
async fn needs_review_then_approve_emits_one_execute_directive() {
    let dir = tempfile::tempdir().unwrap();
    let config = ControllerConfig::new("controller-1", dir.path());
    let engine = ControllerEngine::new(config.clone());

    let mut needs_review = report("sh-clear-1", "needs_review", "clear_range needs review");
    needs_review["review_reasons"] = json!(["clear_range on A1:Z100: risk=high"]);
    needs_review["risks"] = json!(["large range clear"]);
    needs_review["proposed_changes"] = json!([{
        "op": "clear_range",
        "target": "A1:Z100",
        "explanation": "large clear",
        "confidence": 0.9,
        "estimated_risk": "high"
    }]);
    write_report(&config, "sheets-team", "sheets-agent", "20260224T103300Z_report.json", &needs_review);

    engine.process_inbox(None).await.unwrap();

    let candidates: Vec<_> = std::fs::read_dir(config.candidates_dir()).unwrap().flatten().collect();
    assert_eq!(candidates.len(), 1);
    let candidate_content = std::fs::read_to_string(candidates[0].path()).unwrap();
    assert!(candidate_content.contains("\"pending_review\""));

    let input = json!({
        "candidate_id": "cand-sh-clear-1",
        "decision": "approve",
        "reviewer": "alice",
        "notes": "looks fine"
    });
    engine.handle_task("review_candidate", input).await.unwrap();

    let agent_outbox = config.outbox_dir().join("sheets-team").join("sheets-agent");
    let approved_files: Vec<_> = std::fs::read_dir(&agent_outbox)
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().ends_with("_approved_directive.json"))
        .collect();
    assert_eq!(approved_files.len(), 1);
    let content = std::fs::read_to_string(approved_files[0].path()).unwrap();
    assert!(content.contains("\"command\": \"execute_approved_change\""));
}

#[tokio::test]
async fn tampered_report_is_flagged_and_left_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let config = ControllerConfig::new("controller-1", dir.path());
    let engine = ControllerEngine::new(config.clone());

    let path = write_report(&config, "sheets-team", "sheets-agent", "20260224T103300Z_report.json", &report("sh-tamper-1", "success", "looks fine"));
    let mut hash_path = path.clone().into_os_string();
    hash_path.push(".hash");
    std::fs::write(Path::new(&hash_path), "0".repeat(64)).unwrap();

    let summary = engine.process_inbox(None).await.unwrap();
    assert_eq!(summary.processed[0].outcome, "tampered");
    assert!(path.exists(), "tampered report must not be renamed or removed");
}
