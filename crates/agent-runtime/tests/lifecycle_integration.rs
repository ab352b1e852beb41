//! Full-cycle integration test for the generic agent runner against a
//! real `tempfile::TempDir`-backed filesystem layout: write a task,
//! run one cycle, check the report, lock release, and archival.

use agent_runtime::{AgentConfig, AgentRunner, CycleOutcome, SheetsReportGenerator};
use serde_json::json;
use std::path::Path;
use tempfile::tempdir;

fn write_sheets_task(dir: &Path, task_id: &str, range: &str) {
    std::fs::create_dir_all(dir).unwrap();
    let body = json!({
        "task_id": task_id,
        "user_id": "u-1",
        "team_id": "sheets-team",
        "request": {
            "kind": "spreadsheet_change",
            "sheet": {"spreadsheet_id": "sheet-1", "sheet_name": "Budget"},
            "requested_changes": [{"op": "update_cell", "range": range}]
        },
        "metadata": {"source": "cron", "priority": "normal", "timestamp": "2026-01-01T00:00:00Z"}
    });
    std::fs::write(dir.join(format!("20260224T103300Z_{task_id}.json")), body.to_string()).unwrap();
}

fn sheets_runner(root: &Path) -> AgentRunner<SheetsReportGenerator> {
    let config = AgentConfig::new("sheets-agent", "sheets-team", root);
    AgentRunner::new(config, SheetsReportGenerator::new("sheets-agent"), |task| {
        if let platform_core::RequestPayload::SpreadsheetChange { sheet, .. } = &task.request {
            sheet.spreadsheet_id.clone()
        } else {
            task.task_id.clone()
        }
    })
}

#[tokio::test]
async fn happy_path_cycle_writes_a_success_report() {
    let dir = tempdir().unwrap();
    let runner = sheets_runner(dir.path());
    write_sheets_task(&runner_tasks_dir(dir.path()), "sh-042", "B5:B5");

    let outcome = runner.run_once().await.unwrap();
    match outcome {
        CycleOutcome::Processed { task_id, status } => {
            assert_eq!(task_id, "sh-042");
            assert_eq!(status, "Success");
        }
        other => panic!("expected Processed(Success), got {other:?}"),
    }

    let outbox = dir.path().join("Controller/inbox/sheets-team/sheets-agent");
    let reports: Vec<_> = std::fs::read_dir(&outbox).unwrap().collect();
    assert_eq!(reports.len(), 1);
}

#[tokio::test]
async fn large_range_clear_elevates_to_needs_review() {
    let dir = tempdir().unwrap();
    let runner = sheets_runner(dir.path());
    let tasks_dir = runner_tasks_dir(dir.path());
    std::fs::create_dir_all(&tasks_dir).unwrap();
    let body = json!({
        "task_id": "sh-clear-1",
        "user_id": "u-1",
        "team_id": "sheets-team",
        "request": {
            "kind": "spreadsheet_change",
            "sheet": {"spreadsheet_id": "sheet-1", "sheet_name": "Budget"},
            "requested_changes": [{"op": "clear_range", "range": "A1:Z100"}]
        },
        "metadata": {"source": "cron", "priority": "normal", "timestamp": "2026-01-01T00:00:00Z"}
    });
    std::fs::write(tasks_dir.join("20260224T103301Z_sh-clear-1.json"), body.to_string()).unwrap();

    let outcome = runner.run_once().await.unwrap();
    match outcome {
        CycleOutcome::Processed { status, .. } => assert_eq!(status, "NeedsReview"),
        other => panic!("expected Processed(NeedsReview), got {other:?}"),
    }
}

#[tokio::test]
async fn two_cycles_with_no_new_task_after_archival_yield_no_task() {
    let dir = tempdir().unwrap();
    let runner = sheets_runner(dir.path());
    write_sheets_task(&runner_tasks_dir(dir.path()), "sh-100", "A1:A1");

    runner.run_once().await.unwrap();
    let second = runner.run_once().await.unwrap();
    assert_eq!(second, CycleOutcome::NoTask);
}

fn runner_tasks_dir(root: &Path) -> std::path::PathBuf {
    root.join("tasks/sheets-team/sheets-agent")
}
