//! Frozen Controller configuration, `CTRL_*` environment prefix.
//! Derived paths follow the project's filesystem layout, computed from
//! one `project_root` field.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub controller_id: String,
    pub project_root: PathBuf,
    pub lock_timeout_seconds: i64,
    pub lock_max_retries: u32,
    pub lock_backoff_base: f64,
    pub max_retries: u32,
    pub retry_backoff_base: f64,
    pub retry_stale_age: Duration,
    pub down_failure_threshold: u32,
    pub degraded_failure_threshold: u32,
    pub down_silence_minutes: i64,
    pub degraded_silence_minutes: i64,
}

impl ControllerConfig {
    pub fn new(controller_id: impl Into<String>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            controller_id: controller_id.into(),
            project_root: project_root.into(),
            lock_timeout_seconds: 60,
            lock_max_retries: 3,
            lock_backoff_base: 0.5,
            max_retries: 3,
            retry_backoff_base: 2.0,
            retry_stale_age: Duration::from_secs(72 * 3600),
            down_failure_threshold: 6,
            degraded_failure_threshold: 3,
            down_silence_minutes: 30,
            degraded_silence_minutes: 10,
        }
    }

    /// Overrides fields from `CTRL_*` environment variables when present.
    pub fn apply_env(mut self) -> Self {
        if let Ok(v) = std::env::var("CTRL_PROJECT_ROOT") {
            self.project_root = PathBuf::from(v);
        }
        if let Some(v) = std::env::var("CTRL_LOCK_TIMEOUT_SECONDS").ok().and_then(|v| v.parse().ok()) {
            self.lock_timeout_seconds = v;
        }
        if let Some(v) = std::env::var("CTRL_MAX_RETRIES").ok().and_then(|v| v.parse().ok()) {
            self.max_retries = v;
        }
        if let Some(v) = std::env::var("CTRL_RETRY_BACKOFF_BASE").ok().and_then(|v| v.parse().ok()) {
            self.retry_backoff_base = v;
        }
        if let Some(v) = std::env::var("CTRL_DOWN_FAILURE_THRESHOLD").ok().and_then(|v| v.parse().ok()) {
            self.down_failure_threshold = v;
        }
        if let Some(v) = std::env::var("CTRL_DEGRADED_FAILURE_THRESHOLD").ok().and_then(|v| v.parse().ok()) {
            self.degraded_failure_threshold = v;
        }
        self
    }

    pub fn inbox_dir(&self) -> PathBuf {
        self.project_root.join("Controller/inbox")
    }

    pub fn outbox_dir(&self) -> PathBuf {
        self.project_root.join("Controller/outbox")
    }

    pub fn escalation_dir(&self) -> PathBuf {
        self.outbox_dir().join("escalation")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.project_root.join("Controller/state")
    }

    pub fn candidates_dir(&self) -> PathBuf {
        self.state_dir().join("candidates")
    }

    pub fn retry_state_path(&self) -> PathBuf {
        self.state_dir().join("retry_state.json")
    }

    pub fn system_health_path(&self) -> PathBuf {
        self.state_dir().join("system_health.json")
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.state_dir().join("audit_log.jsonl")
    }

    pub fn audit_dir(&self) -> PathBuf {
        self.project_root.join("audit")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.project_root.join("locks")
    }

    pub fn state_document_path(&self) -> PathBuf {
        self.project_root.join("Orchestrator/STATE.md")
    }

    pub fn state_backup_dir(&self) -> PathBuf {
        self.project_root.join("Orchestrator/.backup")
    }

    pub fn health_file_dir(&self) -> PathBuf {
        self.project_root.join("health")
    }
}
