//! Declarative structural schemas plus semantic (cross-field) checks for
//! the three record kinds that cross a process boundary in this system:
//! task envelopes, reports, and the Controller's typed task requests.
//!
//! Schema violations and semantic violations are surfaced together —
//! there is no short-circuit on the first schema error.

pub mod schema;
pub mod schemas;
pub mod semantic;

use serde_json::Value;

pub use schema::{FieldSpec, FieldType, RecordSchema};
pub use schemas::{CONTROLLER_TASK_SCHEMA, REPORT_SCHEMA, TASK_ENVELOPE_SCHEMA};

/// Outcome of validating one record: an ok-flag, the error list (schema
/// errors path-prefixed, semantic errors free-form), and the record value
/// unchanged for the caller to parse further on success.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub ok: bool,
    pub errors: Vec<String>,
    pub value: Value,
}

impl ValidationOutcome {
    fn new(value: Value, mut errors: Vec<String>) -> Self {
        errors.dedup();
        Self {
            ok: errors.is_empty(),
            errors,
            value,
        }
    }
}

/// Validates a report record: structural schema plus the
/// `metrics.duration_ms >= 0` semantic rule.
pub fn validate_report(value: Value) -> ValidationOutcome {
    let mut errors = REPORT_SCHEMA.validate(&value);
    if let Some(metrics) = value.get("metrics") {
        errors.extend(semantic::check_report_metrics(metrics));
    }
    ValidationOutcome::new(value, errors)
}

/// Validates a task envelope: structural schema plus per-agent-kind
/// semantic rules over `request`.
pub fn validate_task_envelope(value: Value) -> ValidationOutcome {
    let mut errors = TASK_ENVELOPE_SCHEMA.validate(&value);

    if let Some(request) = value.get("request") {
        match request.get("kind").and_then(Value::as_str) {
            Some("spreadsheet_change") => {
                if let Some(changes) = request.get("requested_changes").and_then(Value::as_array) {
                    errors.extend(semantic::check_spreadsheet_changes(changes));
                }
            }
            Some("auth_operation") => {
                let op = request.get("op").and_then(Value::as_str).unwrap_or("");
                if let Some(target) = request.get("target") {
                    errors.extend(semantic::check_auth_operation(op, target));
                }
            }
            _ => {}
        }
    }

    ValidationOutcome::new(value, errors)
}

/// Validates the Controller's typed task-request file.
pub fn validate_controller_task(value: Value) -> ValidationOutcome {
    let mut errors = CONTROLLER_TASK_SCHEMA.validate(&value);

    if let (Some(skill), Some(input)) = (value.get("skill").and_then(Value::as_str), value.get("input")) {
        errors.extend(semantic::check_controller_task(skill, input));
    }

    ValidationOutcome::new(value, errors)
}
