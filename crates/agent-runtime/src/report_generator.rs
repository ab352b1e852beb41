//! Deterministic transformation from a validated task to a report record:
//! one [`ReportGenerator`] implementation per agent kind, sharing the
//! risk-classification tables in [`crate::operations`].

use crate::operations::{
    auth_profile, backend_profile, elevate_for_range, metrics_profile, sheets_profile, ui_profile,
    OperationProfile, BULK_WRITE_THRESHOLD,
};
use platform_core::{
    ProposedChange, Report, ReportMetrics, ReportStatus, RequestPayload, Risk, TaskEnvelope,
    ValidationEntry,
};
use serde_json::json;

/// Transforms a validated task into a report, or a task's failure into an
/// error report. Implemented once per agent kind so the runner stays
/// generic over what the report actually contains.
pub trait ReportGenerator: Send + Sync {
    fn agent_id(&self) -> &str;

    /// Builds the success/needs-review report for `task`.
    fn generate(&self, task: &TaskEnvelope) -> Report;

    /// Builds the degenerate error-report form: empty proposed changes,
    /// the full error list, status=error.
    fn generate_error(&self, task: &TaskEnvelope, errors: Vec<String>) -> Report {
        error_report(self.agent_id(), task, errors)
    }
}

fn error_report(agent: &str, task: &TaskEnvelope, errors: Vec<String>) -> Report {
    let (timestamp, local_timestamp) = Report::stamp_now();
    Report {
        agent: agent.to_string(),
        timestamp,
        local_timestamp,
        task_id: task.task_id.clone(),
        status: ReportStatus::Error,
        summary: format!("{agent} failed with {} error(s)", errors.len()),
        metrics: ReportMetrics::default(),
        artifacts: Vec::new(),
        next_actions: Vec::new(),
        proposed_changes: Vec::new(),
        validation: Vec::new(),
        risks: Vec::new(),
        errors,
        review_reasons: Vec::new(),
    }
}

fn finalize(agent: &str, task: &TaskEnvelope, proposed_changes: Vec<ProposedChange>, validation: Vec<ValidationEntry>) -> Report {
    let (status, review_reasons) = Report::classify_status(&proposed_changes);
    let risks = proposed_changes
        .iter()
        .filter(|c| c.estimated_risk == Risk::High)
        .map(|c| format!("{} on {} flagged high risk", c.op, c.target))
        .collect();
    let (timestamp, local_timestamp) = Report::stamp_now();
    Report {
        agent: agent.to_string(),
        timestamp,
        local_timestamp,
        task_id: task.task_id.clone(),
        status,
        summary: format!("{agent} produced {} proposed change(s)", proposed_changes.len()),
        metrics: ReportMetrics::default(),
        artifacts: Vec::new(),
        next_actions: Vec::new(),
        proposed_changes,
        validation,
        risks,
        errors: Vec::new(),
        review_reasons,
    }
}

fn proposed_change(op: &str, target: serde_json::Value, new_values: Option<serde_json::Value>, profile: OperationProfile, explanation: String) -> ProposedChange {
    ProposedChange {
        op: op.to_string(),
        target,
        old_values: None,
        new_values,
        explanation,
        confidence: profile.confidence,
        estimated_risk: profile.risk,
    }
}

/// Generates reports for the spreadsheet-editing agent kind.
pub struct SheetsReportGenerator {
    agent_id: String,
}

impl SheetsReportGenerator {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self { agent_id: agent_id.into() }
    }
}

impl ReportGenerator for SheetsReportGenerator {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn generate(&self, task: &TaskEnvelope) -> Report {
        let RequestPayload::SpreadsheetChange { sheet, requested_changes } = &task.request else {
            return error_report(self.agent_id(), task, vec!["unsupported request kind for sheets agent".into()]);
        };

        let validation = vec![
            ValidationEntry {
                field: "sheet.spreadsheet_id".into(),
                ok: !sheet.spreadsheet_id.is_empty(),
                notes: String::new(),
            },
            ValidationEntry {
                field: "requested_changes".into(),
                ok: !requested_changes.is_empty(),
                notes: String::new(),
            },
        ];

        let bulk = requested_changes.len() > BULK_WRITE_THRESHOLD;
        let proposed_changes = requested_changes
            .iter()
            .map(|change| {
                let mut profile = elevate_for_range(sheets_profile(&change.op), &change.range);
                if bulk {
                    profile = OperationProfile { risk: Risk::High, ..profile };
                }
                proposed_change(
                    &change.op,
                    json!({
                        "spreadsheet_id": sheet.spreadsheet_id,
                        "sheet_name": sheet.sheet_name,
                        "range": change.range,
                    }),
                    change.values.clone(),
                    profile,
                    format!("{} over {} on {}", change.op, change.range, sheet.sheet_name),
                )
            })
            .collect();

        finalize(self.agent_id(), task, proposed_changes, validation)
    }
}

/// Generates reports for the auth-administration agent kind.
pub struct AuthReportGenerator {
    agent_id: String,
}

impl AuthReportGenerator {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self { agent_id: agent_id.into() }
    }
}

impl ReportGenerator for AuthReportGenerator {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn generate(&self, task: &TaskEnvelope) -> Report {
        let RequestPayload::AuthOperation { op, auth_type, target } = &task.request else {
            return error_report(self.agent_id(), task, vec!["unsupported request kind for auth agent".into()]);
        };

        let validation = vec![
            ValidationEntry { field: "op".into(), ok: !op.is_empty(), notes: String::new() },
            ValidationEntry { field: "target".into(), ok: !target.is_empty(), notes: String::new() },
        ];

        let profile = auth_profile(op, auth_type);
        let proposed_changes = vec![proposed_change(
            op,
            json!({"auth_type": auth_type, "target": target}),
            None,
            profile,
            format!("{op} on {auth_type} target {target}"),
        )];

        finalize(self.agent_id(), task, proposed_changes, validation)
    }
}

/// Generates reports for the backend-mutation agent kind.
pub struct BackendReportGenerator {
    agent_id: String,
}

impl BackendReportGenerator {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self { agent_id: agent_id.into() }
    }
}

impl ReportGenerator for BackendReportGenerator {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn generate(&self, task: &TaskEnvelope) -> Report {
        let RequestPayload::BackendRequest { op, changes } = &task.request else {
            return error_report(self.agent_id(), task, vec!["unsupported request kind for backend agent".into()]);
        };

        let validation = vec![ValidationEntry {
            field: "changes".into(),
            ok: !changes.is_empty(),
            notes: String::new(),
        }];

        let profile = backend_profile(op, changes.len());
        let proposed_changes = vec![proposed_change(
            op,
            json!({"change_count": changes.len()}),
            None,
            profile,
            format!("{op} across {} change(s)", changes.len()),
        )];

        finalize(self.agent_id(), task, proposed_changes, validation)
    }
}

/// Generates reports for the read-only metrics agent kind.
pub struct MetricsReportGenerator {
    agent_id: String,
}

impl MetricsReportGenerator {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self { agent_id: agent_id.into() }
    }
}

impl ReportGenerator for MetricsReportGenerator {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn generate(&self, task: &TaskEnvelope) -> Report {
        let RequestPayload::MetricsRequest { metric, window } = &task.request else {
            return error_report(self.agent_id(), task, vec!["unsupported request kind for metrics agent".into()]);
        };

        let validation = vec![ValidationEntry {
            field: "metric".into(),
            ok: !metric.is_empty(),
            notes: String::new(),
        }];

        let profile = metrics_profile(metric);
        let proposed_changes = vec![proposed_change(
            "compute_metric",
            json!({"metric": metric, "window": window}),
            None,
            profile,
            format!("computed {metric} over window {window}"),
        )];

        finalize(self.agent_id(), task, proposed_changes, validation)
    }
}

/// Generates reports for the UI-rendering agent kind.
pub struct UiReportGenerator {
    agent_id: String,
}

impl UiReportGenerator {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self { agent_id: agent_id.into() }
    }
}

impl ReportGenerator for UiReportGenerator {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn generate(&self, task: &TaskEnvelope) -> Report {
        let RequestPayload::UiRender { component, props } = &task.request else {
            return error_report(self.agent_id(), task, vec!["unsupported request kind for ui agent".into()]);
        };

        let validation = vec![ValidationEntry {
            field: "component".into(),
            ok: !component.is_empty(),
            notes: String::new(),
        }];

        let profile = ui_profile(component);
        let proposed_changes = vec![proposed_change(
            "render_component",
            json!({"component": component}),
            Some(props.clone()),
            profile,
            format!("rendered component {component}"),
        )];

        finalize(self.agent_id(), task, proposed_changes, validation)
    }
}
