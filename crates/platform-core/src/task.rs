use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Priority attached to a task's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

/// Envelope metadata common to every task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub source: String,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    pub timestamp: DateTime<Utc>,
}

fn default_priority() -> Priority {
    Priority::Normal
}

/// A single requested sheet change within a sheets task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetChange {
    pub op: String,
    pub range: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<serde_json::Value>,
}

/// A spreadsheet identifier/name pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetRef {
    pub spreadsheet_id: String,
    pub sheet_name: String,
}

/// The agent-kind-specific request payload carried by a task envelope.
///
/// A tagged union over the known operation kinds — closed at compile
/// time rather than a dynamically dict-shaped request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestPayload {
    SpreadsheetChange {
        sheet: SheetRef,
        requested_changes: Vec<SheetChange>,
    },
    AuthOperation {
        op: String,
        auth_type: String,
        target: String,
    },
    BackendRequest {
        op: String,
        changes: Vec<serde_json::Value>,
    },
    MetricsRequest {
        metric: String,
        window: String,
    },
    UiRender {
        component: String,
        props: serde_json::Value,
    },
}

/// A unit of work produced by an external producer and consumed by exactly
/// one agent. Immutable once enqueued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task_id: String,
    pub user_id: String,
    pub team_id: String,
    pub request: RequestPayload,
    pub metadata: TaskMetadata,
}
