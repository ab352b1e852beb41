//! The generic per-agent cycle: locate a task, validate it, check
//! idempotency, acquire the right lock (and, for rate-limited agents, a
//! rate-limit slot), generate a report, write it, archive the task, and
//! always release the lock and write the audit/health trail — even when
//! the cycle aborts partway through.

use crate::config::AgentConfig;
use crate::report_generator::ReportGenerator;
use platform_core::{PlatformResult, TaskEnvelope};
use platform_security::{AuditError, AuditLogger, LockManager, OpStep, RateLimiter, RuntimeMetrics, StateStore};
use platform_queue::QueueAdapter;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// What happened to the one task [`AgentRunner::run_once`] considered,
/// if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No task was available from either the file inbox or the broker.
    NoTask,
    /// A task with this id already had a report on disk; treated as
    /// success and skipped without regenerating it.
    AlreadyProcessed { task_id: String },
    /// The task failed schema/semantic validation; an error report was
    /// written.
    Invalid { task_id: String, errors: Vec<String> },
    /// The task was processed end to end; carries the resulting report's
    /// status as a string (avoids pulling `ReportStatus` into this enum's
    /// `PartialEq` surface for callers that only care about the label).
    Processed { task_id: String, status: String },
}

/// Drives one agent kind's full cycle. Generic over the
/// [`ReportGenerator`] and the resource-id extraction closure, so the
/// sheets/auth/backend/metrics/ui agent bodies share this loop without
/// per-agent duplication.
pub struct AgentRunner<G: ReportGenerator> {
    config: AgentConfig,
    generator: G,
    resource_id_fn: Box<dyn Fn(&TaskEnvelope) -> String + Send + Sync>,
    lock_manager: LockManager,
    rate_limiter: Option<RateLimiter>,
    queue: Option<Box<dyn QueueAdapter>>,
    audit: AuditLogger,
    consecutive_failures: Mutex<u32>,
}

impl<G: ReportGenerator> AgentRunner<G> {
    pub fn new(
        config: AgentConfig,
        generator: G,
        resource_id_fn: impl Fn(&TaskEnvelope) -> String + Send + Sync + 'static,
    ) -> Self {
        let lock_manager = LockManager::with_file_backend(
            generator.agent_id().to_string(),
            config.locks_dir(),
            "",
            config.lock_timeout_seconds,
            config.lock_max_retries,
            config.lock_backoff_base,
        );
        let audit = AuditLogger::new(config.audit_dir());
        Self {
            config,
            generator,
            resource_id_fn: Box::new(resource_id_fn),
            lock_manager,
            rate_limiter: None,
            queue: None,
            audit,
            consecutive_failures: Mutex::new(0),
        }
    }

    /// Enables the rate-limit step — only the sheets agent uses this in
    /// practice.
    pub fn with_rate_limiter(mut self) -> Self {
        self.rate_limiter = Some(RateLimiter::new(
            self.config.rate_limit_state_dir(),
            self.generator.agent_id().to_string(),
            self.config.rate_limit_per_minute,
            self.config.rate_limit_per_day,
            0.5,
            self.config.rate_limit_max_wait,
        ));
        self
    }

    /// Supplies a broker queue adapter as a fallback task source when the
    /// file inbox is empty.
    pub fn with_queue(mut self, queue: Box<dyn QueueAdapter>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Runs exactly one cycle.
    pub async fn run_once(&self) -> PlatformResult<CycleOutcome> {
        let started = Instant::now();
        let Some(located) = self.locate_task().await else {
            return Ok(CycleOutcome::NoTask);
        };

        let mut op_steps = vec![OpStep::now("task_located")];
        let raw: Value = serde_json::from_str(&located.contents)?;

        let outcome_report = schema_validator::validate_task_envelope(raw.clone());
        if !outcome_report.ok {
            let task_id = raw.get("task_id").and_then(Value::as_str).unwrap_or("unknown").to_string();
            warn!(task_id = %task_id, errors = ?outcome_report.errors, "task failed validation");
            self.archive(&located).await;
            self.record_health(false);
            self.audit.record(
                task_id.clone(),
                self.generator.agent_id().to_string(),
                None,
                Some(self.config.team_id.clone()),
                "v1",
                op_steps,
                None,
                RuntimeMetrics { duration_ms: started.elapsed().as_millis() as u64, tokens_in: None, tokens_out: None },
                None,
            );
            return Ok(CycleOutcome::Invalid { task_id, errors: outcome_report.errors });
        }

        let task: TaskEnvelope = serde_json::from_value(raw)?;
        op_steps.push(OpStep::now("task_validated"));

        if self.report_already_exists(&task.task_id) {
            info!(task_id = %task.task_id, "report already exists, treating as success");
            self.archive(&located).await;
            return Ok(CycleOutcome::AlreadyProcessed { task_id: task.task_id });
        }

        let resource_id = (self.resource_id_fn)(&task);
        let lock_guard = match self.lock_manager.acquire(&resource_id, Some(&task.task_id)).await {
            Ok(guard) => guard,
            Err(err) => {
                self.record_cycle_failure(&task, op_steps, started, &err);
                return Err(err);
            }
        };
        op_steps.push(OpStep::now("lock_acquired"));

        if let Some(limiter) = &self.rate_limiter {
            if let Err(err) = limiter.acquire().await {
                drop(lock_guard);
                self.record_cycle_failure(&task, op_steps, started, &err);
                return Err(err);
            }
            op_steps.push(OpStep::now("rate_limit_acquired"));
        }

        let report = self.generator.generate(&task);
        op_steps.push(OpStep::now("report_generated"));

        let report_path = self.write_report(&report).await?;
        op_steps.push(OpStep::now("report_written"));

        self.archive(&located).await;
        op_steps.push(OpStep::now("task_archived"));

        drop(lock_guard);

        let succeeded = !matches!(report.status, platform_core::ReportStatus::Error);
        self.record_health(succeeded);

        let checksum = platform_core::compute_hash(&report).ok();
        self.audit.record(
            task.task_id.clone(),
            self.generator.agent_id().to_string(),
            Some(task.user_id.clone()),
            Some(task.team_id.clone()),
            "v1",
            op_steps,
            checksum,
            RuntimeMetrics { duration_ms: started.elapsed().as_millis() as u64, tokens_in: None, tokens_out: None },
            None,
        );

        info!(task_id = %task.task_id, report = %report_path.display(), status = ?report.status, "agent cycle complete");
        Ok(CycleOutcome::Processed { task_id: task.task_id, status: format!("{:?}", report.status) })
    }

    async fn locate_task(&self) -> Option<LocatedTask> {
        if let Some(path) = self.oldest_pending_task_file().await {
            if let Ok(contents) = tokio::fs::read_to_string(&path).await {
                return Some(LocatedTask { source: TaskSource::File(path), contents });
            }
        }

        if let Some(queue) = &self.queue {
            if let Ok(Some(value)) = queue.pop(&format!("tasks:{}", self.generator.agent_id()), Duration::from_millis(200)).await {
                return Some(LocatedTask { source: TaskSource::Broker, contents: value.to_string() });
            }
        }

        None
    }

    async fn oldest_pending_task_file(&self) -> Option<PathBuf> {
        let dir = self.config.tasks_dir();
        let mut entries = tokio::fs::read_dir(&dir).await.ok()?;
        let mut candidates = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.ends_with(".json") && !name.ends_with(".done.json") {
                candidates.push(path);
            }
        }
        candidates.sort();
        candidates.into_iter().next()
    }

    fn report_already_exists(&self, task_id: &str) -> bool {
        let dir = self.config.report_outbox_dir();
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return false;
        };
        entries.flatten().any(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| name.contains(task_id))
                .unwrap_or(false)
        })
    }

    async fn write_report(&self, report: &platform_core::Report) -> PlatformResult<PathBuf> {
        let dir = self.config.report_outbox_dir();
        let filename = format!("{}_{}_report.json", report.timestamp.format("%Y%m%dT%H%M%S%.3fZ"), report.task_id);
        let path = dir.join(filename);
        StateStore::save(&path, report)?;
        Ok(path)
    }

    async fn archive(&self, task: &LocatedTask) {
        if let TaskSource::File(path) = &task.source {
            let archived = with_done_suffix(path);
            if let Err(err) = tokio::fs::rename(path, &archived).await {
                warn!(path = %path.display(), error = %err, "failed to archive processed task");
            }
        }
    }

    /// Records health and audit trail for a cycle that aborted after
    /// locating a task but before a report was generated (lock contention,
    /// a rate-limit timeout). Mirrors the bookkeeping the happy path and
    /// the validation-failure path both already do.
    fn record_cycle_failure(
        &self,
        task: &TaskEnvelope,
        op_steps: Vec<OpStep>,
        started: Instant,
        err: &platform_core::PlatformError,
    ) {
        self.record_health(false);
        self.audit.record(
            task.task_id.clone(),
            self.generator.agent_id().to_string(),
            Some(task.user_id.clone()),
            Some(task.team_id.clone()),
            "v1",
            op_steps,
            None,
            RuntimeMetrics { duration_ms: started.elapsed().as_millis() as u64, tokens_in: None, tokens_out: None },
            Some(AuditError { error_type: platform_error_type(err).to_string(), message: err.to_string(), stack: String::new() }),
        );
    }

    fn record_health(&self, succeeded: bool) {
        let mut failures = self.consecutive_failures.lock().unwrap_or_else(|e| e.into_inner());
        *failures = if succeeded { 0 } else { *failures + 1 };
        let entry = serde_json::json!({
            "last_run": chrono::Utc::now().to_rfc3339(),
            "status": if succeeded { "success" } else { "error" },
            "consecutive_failures": *failures,
        });
        let path = self.config.health_file();
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(err) = append_line(&path, &entry.to_string()) {
            warn!(error = %err, "failed to append health entry");
        }
    }
}

fn platform_error_type(err: &platform_core::PlatformError) -> &'static str {
    use platform_core::PlatformError::*;
    match err {
        Validation(_) => "Validation",
        Lock(_) => "Lock",
        RateLimit(_) => "RateLimit",
        Integrity(_) => "Integrity",
        Unauthorized(_) => "Unauthorized",
        Queue(_) => "Queue",
        Schema(_) => "Schema",
        Io(_) => "Io",
        Serialization(_) => "Serialization",
    }
}

fn with_done_suffix(path: &Path) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("task");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("json");
    path.with_file_name(format!("{stem}.done.{ext}"))
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    file.sync_all()
}

enum TaskSource {
    File(PathBuf),
    Broker,
}

struct LocatedTask {
    source: TaskSource,
    contents: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report_generator::MetricsReportGenerator;
    use tempfile::tempdir;

    fn write_task(dir: &Path, task_id: &str) {
        std::fs::create_dir_all(dir).unwrap();
        let body = serde_json::json!({
            "task_id": task_id,
            "user_id": "u-1",
            "team_id": "metrics-team",
            "request": {"kind": "metrics_request", "metric": "latency", "window": "1h"},
            "metadata": {"source": "cron", "priority": "normal", "timestamp": "2026-01-01T00:00:00Z"},
        });
        std::fs::write(dir.join(format!("20260101T000000Z_{task_id}.json")), body.to_string()).unwrap();
    }

    fn runner(root: &Path) -> AgentRunner<MetricsReportGenerator> {
        let config = AgentConfig::new("metrics-agent", "metrics-team", root);
        AgentRunner::new(config, MetricsReportGenerator::new("metrics-agent"), |task| task.task_id.clone())
    }

    #[tokio::test]
    async fn no_task_returns_no_task_outcome() {
        let dir = tempdir().unwrap();
        let runner = runner(dir.path());
        let outcome = runner.run_once().await.unwrap();
        assert_eq!(outcome, CycleOutcome::NoTask);
    }

    #[tokio::test]
    async fn processes_a_task_writes_report_and_archives() {
        let dir = tempdir().unwrap();
        let runner = runner(dir.path());
        write_task(&runner.config.tasks_dir(), "m-1");

        let outcome = runner.run_once().await.unwrap();
        match outcome {
            CycleOutcome::Processed { task_id, .. } => assert_eq!(task_id, "m-1"),
            other => panic!("expected Processed, got {other:?}"),
        }

        let outbox = runner.config.report_outbox_dir();
        let reports: Vec<_> = std::fs::read_dir(&outbox).unwrap().collect();
        assert_eq!(reports.len(), 1);

        let tasks: Vec<_> = std::fs::read_dir(runner.config.tasks_dir())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert!(tasks.iter().any(|n| n.contains(".done.")));
    }

    #[tokio::test]
    async fn repeating_the_same_task_id_is_idempotent() {
        let dir = tempdir().unwrap();
        let runner = runner(dir.path());
        write_task(&runner.config.tasks_dir(), "m-2");
        runner.run_once().await.unwrap();

        write_task(&runner.config.tasks_dir(), "m-2");
        let outcome = runner.run_once().await.unwrap();
        assert_eq!(outcome, CycleOutcome::AlreadyProcessed { task_id: "m-2".to_string() });
    }

    #[tokio::test]
    async fn invalid_task_is_recorded_and_archived() {
        let dir = tempdir().unwrap();
        let runner = runner(dir.path());
        let tasks_dir = runner.config.tasks_dir();
        std::fs::create_dir_all(&tasks_dir).unwrap();
        std::fs::write(tasks_dir.join("20260101T000000Z_bad.json"), "{\"task_id\": \"bad-1\"}").unwrap();

        let outcome = runner.run_once().await.unwrap();
        match outcome {
            CycleOutcome::Invalid { task_id, errors } => {
                assert_eq!(task_id, "bad-1");
                assert!(!errors.is_empty());
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }
}
