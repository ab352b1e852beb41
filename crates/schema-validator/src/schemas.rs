use crate::schema::{FieldSpec, FieldType, RecordSchema};

/// External report contract: required core fields, optional arrays.
/// Agents may add fields beyond these, so this schema is intentionally
/// looser than `additionalProperties=false` — it validates presence and
/// type of the required core, not closure over the whole object.
pub const REPORT_SCHEMA: RecordSchema = RecordSchema {
    name: "report",
    fields: &[
        FieldSpec::required("agent", FieldType::String),
        FieldSpec::required("timestamp", FieldType::String),
        FieldSpec::required("task_id", FieldType::String),
        FieldSpec::required("status", FieldType::String)
            .with_enum(&["success", "failure", "error", "needs_review", "partial"]),
        FieldSpec::required("summary", FieldType::String),
        FieldSpec::required("metrics", FieldType::Object),
        FieldSpec::optional("artifacts", FieldType::Array),
        FieldSpec::optional("next_actions", FieldType::Array),
        FieldSpec::optional("proposed_changes", FieldType::Array),
        FieldSpec::optional("validation", FieldType::Array),
        FieldSpec::optional("risks", FieldType::Array),
        FieldSpec::optional("errors", FieldType::Array),
        FieldSpec::optional("review_reasons", FieldType::Array),
    ],
};

/// Task envelope structural schema. `additionalProperties=false`:
/// the reference task producers emit exactly this shape.
pub const TASK_ENVELOPE_SCHEMA: RecordSchema = RecordSchema {
    name: "task",
    fields: &[
        FieldSpec::required("task_id", FieldType::String),
        FieldSpec::required("user_id", FieldType::String),
        FieldSpec::required("team_id", FieldType::String),
        FieldSpec::required("request", FieldType::Object),
        FieldSpec::required("metadata", FieldType::Object),
    ],
};

/// The Controller's typed request file, as read by its task-based entry
/// point.
pub const CONTROLLER_TASK_SCHEMA: RecordSchema = RecordSchema {
    name: "controller_task",
    fields: &[
        FieldSpec::required("skill", FieldType::String).with_enum(&[
            "process_inbox",
            "emit_directive",
            "check_health",
            "review_candidate",
            "reroute_task",
            "aggregate_team_reports",
            "update_state",
        ]),
        FieldSpec::required("input", FieldType::Object),
    ],
};
