//! Per-task retry bookkeeping and directive emission.

use crate::directives::emit_directive;
use chrono::Utc;
use platform_core::{DirectiveCommand, PlatformResult, RetryRecord, RetryStatus};
use platform_security::StateStore;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Persists a `task_id -> RetryRecord` map to a single JSON file, guarded
/// by a process-local mutex so concurrent callers within one Controller
/// don't race on the read-modify-write.
pub struct RetryManager {
    state_path: PathBuf,
    outbox_dir: PathBuf,
    escalation_dir: PathBuf,
    controller_id: String,
    backoff_base: f64,
    guard: Mutex<()>,
}

impl RetryManager {
    pub fn new(
        state_path: impl Into<PathBuf>,
        outbox_dir: impl Into<PathBuf>,
        escalation_dir: impl Into<PathBuf>,
        controller_id: impl Into<String>,
        backoff_base: f64,
    ) -> Self {
        Self {
            state_path: state_path.into(),
            outbox_dir: outbox_dir.into(),
            escalation_dir: escalation_dir.into(),
            controller_id: controller_id.into(),
            backoff_base,
            guard: Mutex::new(()),
        }
    }

    fn load(&self) -> HashMap<String, RetryRecord> {
        StateStore::load(&self.state_path, HashMap::new())
    }

    fn save(&self, records: &HashMap<String, RetryRecord>) {
        if let Err(err) = StateStore::save(&self.state_path, records) {
            tracing::warn!(error = %err, "failed to persist retry state");
        }
    }

    /// True when `task_id` has no retry record yet, or is still within its
    /// budget and enough time has elapsed since the last attempt
    /// (`backoff_base ^ retry_count` seconds).
    pub fn should_retry(&self, task_id: &str) -> bool {
        let _lock = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let records = self.load();
        let Some(record) = records.get(task_id) else {
            return true;
        };
        if record.retry_count >= record.max_retries {
            return false;
        }
        let elapsed = (Utc::now() - record.last_retry_at).num_seconds().max(0) as f64;
        let required = self.backoff_base.powi(record.retry_count as i32);
        elapsed >= required
    }

    /// Upserts the retry record for `task_id`, incrementing its count (or
    /// creating the first entry), and persists the map.
    pub fn record_failure(&self, task_id: &str, agent: &str, team: &str, max_retries: u32) -> RetryRecord {
        let _lock = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut records = self.load();
        let record = records
            .entry(task_id.to_string())
            .and_modify(RetryRecord::record_failure)
            .or_insert_with(|| RetryRecord::first_failure(task_id, agent, team, max_retries))
            .clone();
        self.save(&records);
        record
    }

    /// Removes `task_id`'s retry record entirely and persists the map.
    pub fn record_success(&self, task_id: &str) {
        let _lock = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut records = self.load();
        if records.remove(task_id).is_some() {
            self.save(&records);
        }
    }

    /// Sweeps entries whose last retry predates `max_age`.
    pub fn cleanup_stale_entries(&self, max_age: Duration) {
        let _lock = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut records = self.load();
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or_default();
        let before = records.len();
        records.retain(|_, record| record.last_retry_at >= cutoff);
        if records.len() != before {
            self.save(&records);
        }
    }

    /// Emits a retry directive to the original agent's outbox.
    pub fn emit_retry_directive(&self, outbox_root: &Path, team: &str, agent: &str, record: &RetryRecord) -> PlatformResult<PathBuf> {
        let dir = outbox_root.join(team).join(agent);
        std::fs::create_dir_all(&dir)?;
        let (_, path) = emit_directive(
            &dir,
            agent,
            DirectiveCommand::RetryTask {
                original_task_id: record.task_id.clone(),
                retry_count: record.retry_count,
                max_retries: record.max_retries,
            },
            self.controller_id.clone(),
            "retry_directive",
        )?;
        Ok(path)
    }

    /// Emits an escalation directive naming the exhaustion reason.
    pub fn emit_escalation_directive(&self, team: &str, agent: &str, record: &RetryRecord, reason: &str) -> PlatformResult<PathBuf> {
        std::fs::create_dir_all(&self.escalation_dir)?;
        let (_, path) = emit_directive(
            &self.escalation_dir,
            "operator",
            DirectiveCommand::Escalate {
                original_task_id: record.task_id.clone(),
                failed_agent: agent.to_string(),
                team: team.to_string(),
                retry_count: record.retry_count,
                reason: reason.to_string(),
            },
            self.controller_id.clone(),
            "escalation",
        )?;
        Ok(path)
    }

    pub fn outbox_dir(&self) -> &Path {
        &self.outbox_dir
    }

    /// True once `task_id`'s record has reached `max_retries`.
    pub fn is_exhausted(&self, task_id: &str) -> bool {
        let records = self.load();
        records.get(task_id).map(RetryRecord::is_exhausted).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn manager(dir: &Path) -> RetryManager {
        RetryManager::new(
            dir.join("retry_state.json"),
            dir.join("outbox"),
            dir.join("outbox/escalation"),
            "controller-1",
            0.0,
        )
    }

    #[test]
    fn first_failure_creates_a_retrying_record() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());
        let record = manager.record_failure("t-1", "sheets-agent", "sheets-team", 3);
        assert_eq!(record.retry_count, 1);
        assert_eq!(record.status, RetryStatus::Retrying);
    }

    #[test]
    fn fourth_failure_with_max_three_is_exhausted() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());
        for _ in 0..3 {
            manager.record_failure("t-1", "sheets-agent", "sheets-team", 3);
        }
        assert!(manager.is_exhausted("t-1"));
    }

    #[test]
    fn record_success_clears_the_entry() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());
        manager.record_failure("t-1", "sheets-agent", "sheets-team", 3);
        manager.record_success("t-1");
        assert!(manager.should_retry("t-1"));
        assert!(!manager.is_exhausted("t-1"));
    }

    #[test]
    fn should_retry_is_true_for_unknown_task() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());
        assert!(manager.should_retry("never-seen"));
    }

    #[test]
    fn emits_a_retry_directive_under_the_agent_outbox() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());
        let record = manager.record_failure("t-1", "sheets-agent", "sheets-team", 3);
        let path = manager.emit_retry_directive(&dir.path().join("outbox"), "sheets-team", "sheets-agent", &record).unwrap();
        assert!(path.exists());
        assert!(path.to_string_lossy().contains("sheets-team"));
    }

    #[test]
    fn emits_an_escalation_directive_with_reason() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());
        let record = manager.record_failure("t-1", "sheets-agent", "sheets-team", 1);
        let path = manager.emit_escalation_directive("sheets-team", "sheets-agent", &record, "max retries exhausted").unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("max retries exhausted"));
    }
}
