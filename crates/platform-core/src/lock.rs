use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Namespace a lock record lives in. Owner-centric locks (Controller-held
/// team-inbox locks) and resource-centric locks (agent resource locks)
/// are distinct namespaces that never collide with each other even if the
/// underlying resource id happens to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockNamespace {
    /// Owner-centric: filename/key is prefixed with the owning controller.
    Owner,
    /// Resource-centric: bare resource id, no owner prefix.
    Resource,
}

/// A short-lived advisory lock record. At most one live record may exist
/// per (namespace, resource_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    pub resource_id: String,
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl LockRecord {
    pub fn new(resource_id: impl Into<String>, owner: impl Into<String>, task_id: Option<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            owner: owner.into(),
            acquired_at: Utc::now(),
            task_id,
        }
    }

    /// True if this record is older than `timeout_seconds` and may be
    /// overridden by a new claimant.
    pub fn is_stale(&self, timeout_seconds: i64) -> bool {
        let age = Utc::now().signed_duration_since(self.acquired_at);
        age.num_seconds() > timeout_seconds
    }

    /// Replaces path separators with underscores. The source makes no claim
    /// of collision-freedom for this mapping — two distinct resource ids
    /// containing different separator characters at the same positions can
    /// still map to the same safe key. This behavior is preserved
    /// deliberately (see SPEC_FULL.md Open Questions) rather than fixed,
    /// to match the reference lock backend's key derivation exactly.
    pub fn safe_key(resource_id: &str) -> String {
        resource_id.replace(['/', '\\'], "_")
    }
}
