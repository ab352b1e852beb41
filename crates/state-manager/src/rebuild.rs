use crate::document::{Row, StateDocument};
use serde_json::Value;
use std::path::Path;

fn upsert_row(rows: &mut Vec<Row>, key_col: &str, key_val: &str, updates: &[(&str, String)]) {
    if let Some(row) = rows.iter_mut().find(|r| r.get(key_col).map(String::as_str) == Some(key_val)) {
        for (col, val) in updates {
            row.insert((*col).to_string(), val.clone());
        }
        return;
    }
    let mut row = Row::new();
    row.insert(key_col.to_string(), key_val.to_string());
    for (col, val) in updates {
        row.insert((*col).to_string(), val.clone());
    }
    rows.push(row);
}

fn walk_json_files(dir: &Path, out: &mut Vec<std::path::PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_json_files(&path, out);
        } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
            out.push(path);
        }
    }
}

/// Reconstructs the document by replaying every processed report under
/// `inbox_dir`, sorted by filename (which starts with a timestamp).
/// Self-reports, example fixtures, and `.hash` companions are skipped.
/// Returns the rebuilt document and the count of reports applied.
pub fn rebuild_state(inbox_dir: &Path, initial: Option<StateDocument>) -> (StateDocument, usize) {
    let mut doc = initial.unwrap_or_else(StateDocument::initial);

    let mut report_files = Vec::new();
    walk_json_files(inbox_dir, &mut report_files);
    report_files.retain(|p| {
        let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
        !name.contains("_self_report")
            && !p.to_string_lossy().contains("example")
            && !name.ends_with(".hash")
    });
    report_files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut count = 0usize;
    for report_path in &report_files {
        let Ok(contents) = std::fs::read_to_string(report_path) else {
            continue;
        };
        let Ok(data) = serde_json::from_str::<Value>(&contents) else {
            continue;
        };

        let agent = data.get("agent").and_then(Value::as_str).unwrap_or("unknown").to_string();
        let status = data.get("status").and_then(Value::as_str).unwrap_or("unknown").to_string();
        let task_id = data.get("task_id").and_then(Value::as_str).unwrap_or("—").to_string();
        let timestamp = data.get("timestamp").and_then(Value::as_str).unwrap_or("—").to_string();
        let is_success = status == "success";

        upsert_row(
            &mut doc.agents,
            "Agent",
            &agent,
            &[
                ("Status", if is_success { "idle".to_string() } else { "error".to_string() }),
                ("Last Task", task_id),
                ("Health", if is_success { "healthy".to_string() } else { "degraded".to_string() }),
            ],
        );

        if let Ok(rel) = report_path.strip_prefix(inbox_dir) {
            if let Some(team_name) = rel.components().next().and_then(|c| c.as_os_str().to_str()) {
                upsert_row(
                    &mut doc.teams,
                    "Team",
                    team_name,
                    &[("Last Report", timestamp), ("Status", "idle".to_string())],
                );
            }
        }

        let metrics = data.get("metrics").cloned().unwrap_or(Value::Null);
        let cost = metrics.get("cost_eur").and_then(Value::as_f64).unwrap_or(0.0);
        let tokens_in = metrics.get("tokens_in").and_then(Value::as_i64).unwrap_or(0);
        let tokens_out = metrics.get("tokens_out").and_then(Value::as_i64).unwrap_or(0);

        let key = if is_success { "total_tasks_completed" } else { "total_tasks_failed" };
        let current = doc.system_metrics.get(key).and_then(Value::as_i64).unwrap_or(0);
        doc.system_metrics.insert(key.to_string(), Value::from(current + 1));

        let total_cost = doc.system_metrics.get("total_cost_eur").and_then(Value::as_f64).unwrap_or(0.0);
        doc.system_metrics.insert(
            "total_cost_eur".to_string(),
            Value::from(((total_cost + cost) * 1_000_000.0).round() / 1_000_000.0),
        );

        let total_tokens = doc.system_metrics.get("total_tokens_consumed").and_then(Value::as_i64).unwrap_or(0);
        doc.system_metrics.insert(
            "total_tokens_consumed".to_string(),
            Value::from(total_tokens + tokens_in + tokens_out),
        );

        count += 1;
    }

    let now = chrono::Utc::now();
    doc.last_updated = now.to_rfc3339();
    doc.system_metrics.insert("cycle_timestamp".to_string(), Value::String(now.to_rfc3339()));
    doc.system_metrics.insert("active_teams".to_string(), Value::from(doc.teams.len() as i64));
    doc.system_metrics.insert("active_agents".to_string(), Value::from(doc.agents.len() as i64));

    (doc, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rebuild_counts_reports_and_updates_metrics() {
        let dir = tempdir().unwrap();
        let inbox = dir.path().join("inbox").join("team-a");
        std::fs::create_dir_all(&inbox).unwrap();
        std::fs::write(
            inbox.join("20260101T000000_report.json"),
            serde_json::json!({
                "agent": "sheets-agent",
                "status": "success",
                "task_id": "t1",
                "timestamp": "2026-01-01T00:00:00Z",
                "metrics": {"cost_eur": 0.01, "tokens_in": 10, "tokens_out": 20}
            })
            .to_string(),
        )
        .unwrap();

        let (doc, count) = rebuild_state(&dir.path().join("inbox"), None);
        assert_eq!(count, 1);
        assert_eq!(doc.system_metrics.get("total_tasks_completed").and_then(Value::as_i64), Some(1));
        assert_eq!(doc.agents.len(), 1);
    }

    #[test]
    fn rebuild_skips_self_reports_and_hash_files() {
        let dir = tempdir().unwrap();
        let inbox = dir.path().join("inbox");
        std::fs::create_dir_all(&inbox).unwrap();
        std::fs::write(inbox.join("x_self_report.json"), "{}").unwrap();
        std::fs::write(inbox.join("y.json.hash"), "deadbeef").unwrap();

        let (_, count) = rebuild_state(&inbox, None);
        assert_eq!(count, 0);
    }
}
