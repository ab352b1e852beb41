use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Down,
}

/// A single change within an [`StateUpdateRequest`], mirroring one cell
/// edit: find the row identified by `field` in `section`, set `column` to
/// `new_value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChangeItem {
    pub section: String,
    pub field: String,
    pub column: String,
    pub old_value: String,
    pub new_value: String,
    pub reason: String,
    pub triggered_by: String,
}

/// A request to update the coordination document. Only `origin ==
/// "controller"` requests are authorized — see
/// [`crate::manager::AUTHORIZED_ORIGIN`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateUpdateRequest {
    pub origin: String,
    pub changes: Vec<StateChangeItem>,
    pub reason: String,
    #[serde(default = "uuid::Uuid::new_v4")]
    pub request_id: uuid::Uuid,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateHealth {
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    pub last_update: Option<DateTime<Utc>>,
    pub state_hash: String,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateUpdateResult {
    pub success: bool,
    pub request_id: uuid::Uuid,
    pub state_hash: String,
    pub errors: Vec<String>,
    pub timestamp: DateTime<Utc>,
}
