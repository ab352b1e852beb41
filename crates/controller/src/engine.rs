//! The Controller's single entry point per cycle: scan the inbox, verify
//! and validate each report, dispatch by status, persist the processing
//! trail, and run the system-wide health check. Also exposes the
//! task-based entry point that dispatches on a `skill` field.

use crate::candidate::{review_candidate, submit_candidate};
use crate::config::ControllerConfig;
use crate::directives::emit_directive;
use crate::inbox_scan::scan_inbox;
use crate::retry_manager::RetryManager;
use chrono::{DateTime, Utc};
use health_monitor::HealthMonitor;
use platform_core::{compute_hash, DirectiveCommand, PlatformError, PlatformResult, Report, ReviewDecision};
use platform_security::LockManager;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use state_manager::{StateManager, StateUpdateRequest};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// One state-change tuple recorded for every processing event in a cycle.
#[derive(Debug, Clone, Serialize)]
pub struct StateChangeRecord {
    pub change_type: String,
    pub team: String,
    pub agent: String,
    pub task_id: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// The disposition recorded for one inbox entry during a cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedReport {
    pub task_id: String,
    pub agent: String,
    pub team: String,
    pub outcome: String,
}

/// Everything observed during one `process_inbox` cycle.
#[derive(Debug, Clone, Serialize, Default)]
pub struct CycleSummary {
    pub processed: Vec<ProcessedReport>,
    pub directive_paths: Vec<PathBuf>,
    pub state_changes: Vec<StateChangeRecord>,
    pub self_report_path: Option<PathBuf>,
}

#[derive(Serialize)]
struct ControllerAuditRecord {
    schema_version: u32,
    timestamp_utc: DateTime<Utc>,
    controller_id: String,
    cycle_id: String,
    op_steps: Vec<String>,
    reports_processed: usize,
    directives_emitted: usize,
    self_report_checksum: Option<String>,
    runtime_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Owns the full Controller cycle: team-inbox locking, retry bookkeeping,
/// candidate submission, and the ambient audit/health trail.
pub struct ControllerEngine {
    config: ControllerConfig,
    retry_manager: RetryManager,
    lock_manager: LockManager,
}

impl ControllerEngine {
    pub fn new(config: ControllerConfig) -> Self {
        let retry_manager = RetryManager::new(
            config.retry_state_path(),
            config.outbox_dir(),
            config.escalation_dir(),
            config.controller_id.clone(),
            config.retry_backoff_base,
        );
        let lock_manager = LockManager::with_file_backend(
            config.controller_id.clone(),
            config.locks_dir(),
            "inbox_",
            config.lock_timeout_seconds,
            config.lock_max_retries,
            config.lock_backoff_base,
        );
        Self { config, retry_manager, lock_manager }
    }

    /// Runs one full inbox-processing cycle, optionally scoped to one team.
    pub async fn process_inbox(&self, team_filter: Option<&str>) -> PlatformResult<CycleSummary> {
        let started = Instant::now();
        let entries = scan_inbox(&self.config.inbox_dir(), team_filter);

        let mut guards = Vec::new();
        let mut locked_teams = HashSet::new();
        let mut skipped_teams = HashSet::new();
        let mut summary = CycleSummary::default();

        for entry in entries {
            if skipped_teams.contains(&entry.team) {
                continue;
            }
            if !locked_teams.contains(&entry.team) {
                match self.lock_manager.acquire(&format!("team-inbox-{}", entry.team), None).await {
                    Ok(guard) => {
                        guards.push(guard);
                        locked_teams.insert(entry.team.clone());
                    }
                    Err(err) => {
                        warn!(team = %entry.team, error = %err, "team inbox lock contended, skipping team");
                        skipped_teams.insert(entry.team.clone());
                        continue;
                    }
                }
            }

            self.process_one(&entry.path, &entry.team, &mut summary);
        }

        drop(guards);

        let self_report = self.build_self_report(&summary);
        let self_report_path = self.write_self_report(&self_report)?;
        summary.self_report_path = Some(self_report_path.clone());

        self.write_cycle_audit(&summary, started.elapsed().as_millis(), &self_report_path, None);

        let down_agents = self.run_health_check();
        for agent in down_agents {
            let probe = platform_core::RetryRecord::first_failure("health-check", agent.clone(), "unassigned", 0);
            if let Ok(path) = self.retry_manager.emit_escalation_directive(
                "unassigned",
                &agent,
                &probe,
                "agent classified as down by system health check",
            ) {
                summary.directive_paths.push(path);
            }
        }

        Ok(summary)
    }

    fn process_one(&self, path: &std::path::Path, team: &str, summary: &mut CycleSummary) {
        let Ok(raw) = std::fs::read_to_string(path) else {
            warn!(path = %path.display(), "failed to read inbox entry");
            return;
        };
        let Ok(value): Result<Value, _> = serde_json::from_str(&raw) else {
            warn!(path = %path.display(), "inbox entry is not valid JSON");
            return;
        };

        let computed_hash = compute_hash(&value).unwrap_or_default();
        let hash_path = companion_hash_path(path);
        let had_hash = hash_path.exists();

        if had_hash {
            if let Ok(existing) = std::fs::read_to_string(&hash_path) {
                if existing.trim() != computed_hash {
                    warn!(path = %path.display(), "report hash mismatch, recording as tampered");
                    summary.processed.push(ProcessedReport {
                        task_id: value.get("task_id").and_then(Value::as_str).unwrap_or("unknown").to_string(),
                        agent: value.get("agent").and_then(Value::as_str).unwrap_or("unknown").to_string(),
                        team: team.to_string(),
                        outcome: "tampered".to_string(),
                    });
                    return;
                }
            }
        }

        let outcome = schema_validator::validate_report(value.clone());
        let task_id = value.get("task_id").and_then(Value::as_str).unwrap_or("unknown").to_string();
        let agent = value.get("agent").and_then(Value::as_str).unwrap_or("unknown").to_string();

        if !outcome.ok {
            warn!(task_id = %task_id, errors = ?outcome.errors, "invalid report");
            summary.processed.push(ProcessedReport { task_id, agent, team: team.to_string(), outcome: "invalid".to_string() });
            self.mark_processed(path);
            return;
        }

        if !had_hash {
            let _ = std::fs::write(&hash_path, &computed_hash);
        }

        let status = value.get("status").and_then(Value::as_str).unwrap_or("").to_string();
        let dispatch_outcome = self.dispatch(&task_id, &agent, team, &status, &value, summary);

        summary.state_changes.push(StateChangeRecord {
            change_type: "report_processed".to_string(),
            team: team.to_string(),
            agent: agent.clone(),
            task_id: task_id.clone(),
            status: status.clone(),
            timestamp: Utc::now(),
        });
        summary.processed.push(ProcessedReport { task_id, agent, team: team.to_string(), outcome: dispatch_outcome });

        self.mark_processed(path);
    }

    fn dispatch(&self, task_id: &str, agent: &str, team: &str, status: &str, value: &Value, summary: &mut CycleSummary) -> String {
        match status {
            "success" => {
                self.retry_manager.record_success(task_id);
                "recorded_success".to_string()
            }
            "error" | "failure" => {
                if self.retry_manager.should_retry(task_id) {
                    let record = self.retry_manager.record_failure(task_id, agent, team, self.config.max_retries);
                    match self.retry_manager.emit_retry_directive(&self.config.outbox_dir(), team, agent, &record) {
                        Ok(path) => {
                            summary.directive_paths.push(path);
                            "retry_directive_emitted".to_string()
                        }
                        Err(err) => {
                            warn!(error = %err, "failed to emit retry directive");
                            "retry_directive_failed".to_string()
                        }
                    }
                } else {
                    let record = self.retry_manager.record_failure(task_id, agent, team, self.config.max_retries);
                    match self.retry_manager.emit_escalation_directive(team, agent, &record, "max retries exhausted") {
                        Ok(path) => {
                            summary.directive_paths.push(path);
                            "escalation_emitted".to_string()
                        }
                        Err(err) => {
                            warn!(error = %err, "failed to emit escalation directive");
                            "escalation_failed".to_string()
                        }
                    }
                }
            }
            "needs_review" => match serde_json::from_value::<Report>(value.clone()) {
                Ok(report) => match submit_candidate(&self.config.candidates_dir(), team, &report) {
                    Ok(_) => "candidate_submitted".to_string(),
                    Err(err) => {
                        warn!(error = %err, "failed to submit candidate");
                        "candidate_submission_failed".to_string()
                    }
                },
                Err(err) => {
                    warn!(error = %err, "failed to parse needs_review report");
                    "candidate_submission_failed".to_string()
                }
            },
            "partial" => "recorded_partial".to_string(),
            other => format!("unhandled_status:{other}"),
        }
    }

    fn mark_processed(&self, path: &std::path::Path) {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { return };
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("json");
        let processed = path.with_file_name(format!("{stem}.processed.{ext}"));
        if let Err(err) = std::fs::rename(path, &processed) {
            warn!(path = %path.display(), error = %err, "failed to mark report processed");
        }
    }

    fn build_self_report(&self, summary: &CycleSummary) -> Report {
        let (timestamp, local_timestamp) = Report::stamp_now();
        Report {
            agent: self.config.controller_id.clone(),
            timestamp,
            local_timestamp,
            task_id: format!("cycle-{}", Uuid::new_v4()),
            status: platform_core::ReportStatus::Success,
            summary: format!(
                "processed {} report(s), emitted {} directive(s)",
                summary.processed.len(),
                summary.directive_paths.len()
            ),
            metrics: platform_core::ReportMetrics::default(),
            artifacts: summary.directive_paths.iter().map(|p| p.display().to_string()).collect(),
            next_actions: Vec::new(),
            proposed_changes: Vec::new(),
            validation: Vec::new(),
            risks: Vec::new(),
            errors: Vec::new(),
            review_reasons: Vec::new(),
        }
    }

    fn write_self_report(&self, report: &Report) -> PlatformResult<PathBuf> {
        let dir = self.config.inbox_dir().join("controller");
        std::fs::create_dir_all(&dir)?;
        let filename = format!("{}_self_report.json", report.timestamp.format("%Y%m%dT%H%M%S%.3fZ"));
        let path = dir.join(filename);
        platform_security::StateStore::save(&path, report)?;
        Ok(path)
    }

    fn write_cycle_audit(&self, summary: &CycleSummary, runtime_ms: u128, self_report_path: &std::path::Path, error: Option<String>) {
        let checksum = std::fs::read_to_string(self_report_path)
            .ok()
            .and_then(|content| serde_json::from_str::<Value>(&content).ok())
            .and_then(|value| compute_hash(&value).ok());

        let record = ControllerAuditRecord {
            schema_version: 1,
            timestamp_utc: Utc::now(),
            controller_id: self.config.controller_id.clone(),
            cycle_id: Uuid::new_v4().to_string(),
            op_steps: summary.processed.iter().map(|p| format!("{}:{}", p.task_id, p.outcome)).collect(),
            reports_processed: summary.processed.len(),
            directives_emitted: summary.directive_paths.len(),
            self_report_checksum: checksum,
            runtime_ms,
            error,
        };

        let dir = self.config.audit_dir().join("controller").join(&self.config.controller_id);
        if std::fs::create_dir_all(&dir).is_ok() {
            let filename = format!("{}_{}.json", record.timestamp_utc.format("%Y%m%dT%H%M%S%.3fZ"), record.cycle_id);
            let _ = platform_security::StateStore::save(&dir.join(filename), &record);
        }
        info!(reports = record.reports_processed, directives = record.directives_emitted, "controller cycle complete");
    }

    fn run_health_check(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.config.health_file_dir()) else {
            return Vec::new();
        };
        let mut paths = HashMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    paths.insert(stem.to_string(), path);
                }
            }
        }

        let thresholds = health_monitor::Thresholds {
            down_failure_threshold: self.config.down_failure_threshold,
            degraded_failure_threshold: self.config.degraded_failure_threshold,
            down_silence_minutes: self.config.down_silence_minutes,
            degraded_silence_minutes: self.config.degraded_silence_minutes,
        };
        let monitor = HealthMonitor::new(
            paths,
            self.config.locks_dir(),
            self.config.inbox_dir(),
            self.config.system_health_path(),
        )
        .with_thresholds(thresholds);
        monitor.check_and_persist();
        monitor.down_agents()
    }

    /// The task-based entry point: dispatches on `skill`.
    pub async fn handle_task(&self, skill: &str, input: Value) -> PlatformResult<Value> {
        match skill {
            "process_inbox" => {
                let team = input.get("team").and_then(Value::as_str);
                let summary = self.process_inbox(team).await?;
                Ok(serde_json::to_value(summary)?)
            }
            "check_health" => {
                let down = self.run_health_check();
                Ok(serde_json::json!({"down_agents": down}))
            }
            "review_candidate" => {
                #[derive(Deserialize)]
                struct Input {
                    candidate_id: String,
                    decision: String,
                    reviewer: String,
                    #[serde(default)]
                    notes: String,
                }
                let parsed: Input = serde_json::from_value(input)?;
                let decision = match parsed.decision.as_str() {
                    "approve" => ReviewDecision::Approve,
                    "reject" => ReviewDecision::Reject,
                    other => return Err(PlatformError::Validation(format!("unknown decision '{other}'"))),
                };
                let record = review_candidate(
                    &self.config.candidates_dir(),
                    &self.config.outbox_dir(),
                    &self.config.controller_id,
                    &parsed.candidate_id,
                    decision,
                    &parsed.reviewer,
                    &parsed.notes,
                )?;
                Ok(serde_json::to_value(record)?)
            }
            "emit_directive" => {
                #[derive(Deserialize)]
                struct DirectiveInput {
                    team: String,
                    target_agent: String,
                    #[serde(flatten)]
                    command: DirectiveCommand,
                }
                #[derive(Deserialize)]
                struct Input {
                    directive: DirectiveInput,
                }
                let parsed: Input = serde_json::from_value(input)?;
                let directive = parsed.directive;
                let dir = self.config.outbox_dir().join(&directive.team).join(&directive.target_agent);
                std::fs::create_dir_all(&dir)?;
                let (built, path) = emit_directive(&dir, directive.target_agent, directive.command, self.config.controller_id.clone(), "directive")?;
                Ok(serde_json::json!({"path": path, "directive_id": built.directive_id}))
            }
            "reroute_task" => {
                #[derive(Deserialize)]
                struct Input {
                    failed_agent: String,
                    task: Value,
                    #[serde(default)]
                    target_agent: Option<String>,
                    #[serde(default = "default_team")]
                    team: String,
                }
                fn default_team() -> String {
                    "unassigned".to_string()
                }
                let parsed: Input = serde_json::from_value(input)?;
                let task_id = parsed.task.get("task_id").and_then(Value::as_str).unwrap_or("unknown").to_string();
                let target = parsed.target_agent.unwrap_or_else(|| parsed.failed_agent.clone());
                let dir = self.config.outbox_dir().join(&parsed.team).join(&target);
                std::fs::create_dir_all(&dir)?;
                let (_, path) = emit_directive(
                    &dir,
                    target,
                    DirectiveCommand::RetryTask { original_task_id: task_id, retry_count: 0, max_retries: self.config.max_retries },
                    self.config.controller_id.clone(),
                    "reroute_directive",
                )?;
                Ok(serde_json::json!({"path": path}))
            }
            "aggregate_team_reports" => {
                #[derive(Deserialize)]
                struct Input {
                    team: String,
                }
                let parsed: Input = serde_json::from_value(input)?;
                Ok(self.aggregate_team_reports(&parsed.team))
            }
            "update_state" => {
                let request: StateUpdateRequest = serde_json::from_value(input)?;
                let manager = StateManager::new(
                    self.config.state_document_path(),
                    self.config.state_backup_dir(),
                    self.config.locks_dir(),
                    self.config.health_file_dir().join("state_manager.jsonl"),
                    self.config.project_root.join("Orchestrator/CHANGELOG.md"),
                    self.config.project_root.join("Orchestrator/MISTAKE.md"),
                    self.config.audit_log_path(),
                    self.config.lock_timeout_seconds,
                );
                let result = manager.update_state(request).await?;
                Ok(serde_json::to_value(result)?)
            }
            other => Err(PlatformError::Validation(format!("unknown skill '{other}'"))),
        }
    }

    fn aggregate_team_reports(&self, team: &str) -> Value {
        let team_dir = self.config.inbox_dir().join(team);
        let mut total = 0usize;
        let mut by_status: HashMap<String, usize> = HashMap::new();
        walk_processed(&team_dir, &mut total, &mut by_status);
        serde_json::json!({"team": team, "total": total, "by_status": by_status})
    }
}

fn walk_processed(dir: &std::path::Path, total: &mut usize, by_status: &mut HashMap<String, usize>) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_processed(&path, total, by_status);
            continue;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if !name.ends_with(".processed.json") {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(&path) else { continue };
        let Ok(value) = serde_json::from_str::<Value>(&content) else { continue };
        *total += 1;
        let status = value.get("status").and_then(Value::as_str).unwrap_or("unknown").to_string();
        *by_status.entry(status).or_insert(0) += 1;
    }
}

fn companion_hash_path(path: &std::path::Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".hash");
    PathBuf::from(os)
}
