use serde_json::Value;

/// Cross-field rules that a structural schema cannot express. Each
/// function takes the raw record and appends free-form error strings
/// (no path prefix, unlike [`crate::schema::RecordSchema::validate`]).

pub fn check_controller_task(skill: &str, input: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    match skill {
        "emit_directive" => {
            if input.get("directive").is_none() {
                errors.push("emit_directive requires input.directive".to_string());
            }
        }
        "reroute_task" => {
            if input.get("failed_agent").is_none() {
                errors.push("reroute_task requires input.failed_agent".to_string());
            }
            if input.get("task").is_none() {
                errors.push("reroute_task requires input.task".to_string());
            }
        }
        "aggregate_team_reports" => {
            if input.get("team").is_none() {
                errors.push("aggregate_team_reports requires input.team".to_string());
            }
        }
        "review_candidate" => {
            if input.get("candidate_id").is_none() {
                errors.push("review_candidate requires input.candidate_id".to_string());
            }
            match input.get("decision").and_then(Value::as_str) {
                Some("approve") | Some("reject") => {}
                _ => errors.push("review_candidate requires input.decision in {approve, reject}".to_string()),
            }
        }
        "process_inbox" | "check_health" | "update_state" => {}
        other => errors.push(format!("unknown skill '{other}'")),
    }
    errors
}

/// Semantic checks for a spreadsheet-change request: every `update`
/// operation must carry `values`; `clear` and other ops do not require
/// them. Mirrors the reference sheets agent's field-presence rule.
pub fn check_spreadsheet_changes(changes: &[Value]) -> Vec<String> {
    let mut errors = Vec::new();
    for (i, change) in changes.iter().enumerate() {
        let op = change.get("op").and_then(Value::as_str).unwrap_or("");
        if op == "update" && change.get("values").is_none() {
            errors.push(format!("requested_changes[{i}]: update requires values"));
        }
    }
    errors
}

/// Semantic check for an auth-agent request: a `revoke` operation must
/// name its target.
pub fn check_auth_operation(op: &str, target: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    if op == "revoke" && target.as_str().map(str::is_empty).unwrap_or(true) {
        errors.push("revoke requires target id".to_string());
    }
    errors
}

/// `metrics.duration_ms` must be present and non-negative.
pub fn check_report_metrics(metrics: &Value) -> Vec<String> {
    match metrics.get("duration_ms").and_then(Value::as_f64) {
        Some(n) if n >= 0.0 => Vec::new(),
        Some(n) => vec![format!("metrics.duration_ms: {n} is negative")],
        None => vec!["metrics.duration_ms: required field missing".to_string()],
    }
}
