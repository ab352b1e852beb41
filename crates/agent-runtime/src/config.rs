//! Frozen per-process configuration for one agent runner.
//! Defaults are baked in here; a binary layers a TOML file and then
//! `AGENT_*` environment variables on top via [`AgentConfig::apply_env`]
//! before constructing an [`crate::runner::AgentRunner`].

use std::path::PathBuf;
use std::time::Duration;

/// Derived filesystem layout is computed from `project_root` rather than
/// re-specified per field.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub agent_id: String,
    pub team_id: String,
    pub project_root: PathBuf,
    pub lock_timeout_seconds: i64,
    pub lock_max_retries: u32,
    pub lock_backoff_base: f64,
    pub rate_limit_per_minute: u32,
    pub rate_limit_per_day: u32,
    pub rate_limit_max_wait: Duration,
    pub task_processing_timeout: Duration,
}

impl AgentConfig {
    pub fn new(agent_id: impl Into<String>, team_id: impl Into<String>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            agent_id: agent_id.into(),
            team_id: team_id.into(),
            project_root: project_root.into(),
            lock_timeout_seconds: 60,
            lock_max_retries: 3,
            lock_backoff_base: 0.5,
            rate_limit_per_minute: 60,
            rate_limit_per_day: 10_000,
            rate_limit_max_wait: Duration::from_secs(30),
            task_processing_timeout: Duration::from_secs(120),
        }
    }

    /// Overrides fields from `AGENT_*` environment variables when present;
    /// unset or unparseable values leave the existing (default or
    /// TOML-loaded) value in place.
    pub fn apply_env(mut self) -> Self {
        if let Ok(v) = std::env::var("AGENT_PROJECT_ROOT") {
            self.project_root = PathBuf::from(v);
        }
        if let Some(v) = std::env::var("AGENT_LOCK_TIMEOUT_SECONDS").ok().and_then(|v| v.parse().ok()) {
            self.lock_timeout_seconds = v;
        }
        if let Some(v) = std::env::var("AGENT_LOCK_MAX_RETRIES").ok().and_then(|v| v.parse().ok()) {
            self.lock_max_retries = v;
        }
        if let Some(v) = std::env::var("AGENT_RATE_LIMIT_PER_MINUTE").ok().and_then(|v| v.parse().ok()) {
            self.rate_limit_per_minute = v;
        }
        if let Some(v) = std::env::var("AGENT_RATE_LIMIT_PER_DAY").ok().and_then(|v| v.parse().ok()) {
            self.rate_limit_per_day = v;
        }
        if let Some(secs) = std::env::var("AGENT_RATE_LIMIT_MAX_WAIT_SECONDS").ok().and_then(|v| v.parse().ok()) {
            self.rate_limit_max_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = std::env::var("AGENT_TASK_TIMEOUT_SECONDS").ok().and_then(|v| v.parse().ok()) {
            self.task_processing_timeout = Duration::from_secs(secs);
        }
        self
    }

    /// Where this agent's inbound tasks are dropped (file-sourced queue),
    /// laid out symmetrically with the Controller's own team/agent
    /// directories.
    pub fn tasks_dir(&self) -> PathBuf {
        self.project_root.join("tasks").join(&self.team_id).join(&self.agent_id)
    }

    /// Where this agent's reports are dropped for the Controller to pick
    /// up — the agent's outbox is the Controller's inbox.
    pub fn report_outbox_dir(&self) -> PathBuf {
        self.project_root.join("Controller/inbox").join(&self.team_id).join(&self.agent_id)
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.project_root.join("locks")
    }

    pub fn audit_dir(&self) -> PathBuf {
        self.project_root.join("audit")
    }

    pub fn rate_limit_state_dir(&self) -> PathBuf {
        self.project_root.join("Controller/state")
    }

    pub fn health_file(&self) -> PathBuf {
        self.project_root.join("health").join(format!("{}.jsonl", self.agent_id))
    }
}
