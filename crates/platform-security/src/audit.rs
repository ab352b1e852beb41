use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::info;

/// One step in an agent invocation's operation sequence, stamped as it
/// happens (e.g. "lock_acquired", "report_generated", "task_archived").
#[derive(Debug, Clone, Serialize)]
pub struct OpStep {
    pub name: String,
    pub at: DateTime<Utc>,
}

impl OpStep {
    pub fn now(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeMetrics {
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_out: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditError {
    pub error_type: String,
    pub message: String,
    pub stack: String,
}

/// One audit record per agent invocation: schema version, timestamp,
/// task/request identity, configuration version, the op-step sequence, a
/// report reference and its checksum, runtime metrics, and an optional
/// error.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub schema_version: u32,
    pub timestamp_utc: DateTime<Utc>,
    pub task_id: String,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    pub config_version: String,
    pub op_steps: Vec<OpStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_checksum: Option<String>,
    pub runtime_metrics: RuntimeMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AuditError>,
}

const SCHEMA_VERSION: u32 = 1;

/// Append-only per-agent audit log. Each record is written to its own file
/// under `{log_dir}/{agent_id}/{timestamp}_{task_id}.json`, written by a
/// background task so callers never block on disk I/O.
pub struct AuditLogger {
    tx: mpsc::UnboundedSender<AuditRecord>,
}

impl AuditLogger {
    pub fn new(log_dir: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AuditRecord>();

        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                let agent_dir = log_dir.join(&record.agent_id);
                if let Err(err) = tokio::fs::create_dir_all(&agent_dir).await {
                    tracing::warn!(error = %err, "failed to create audit directory");
                    continue;
                }
                let filename = format!(
                    "{}_{}.json",
                    record.timestamp_utc.format("%Y%m%dT%H%M%S%.3fZ"),
                    record.task_id
                );
                let path = agent_dir.join(filename);
                match serde_json::to_string_pretty(&record) {
                    Ok(json) => {
                        if let Err(err) = tokio::fs::write(&path, json).await {
                            tracing::warn!(path = %path.display(), error = %err, "failed to write audit record");
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "failed to serialize audit record"),
                }
            }
        });

        Self { tx }
    }

    pub fn record(
        &self,
        task_id: impl Into<String>,
        agent_id: impl Into<String>,
        user_id: Option<String>,
        team: Option<String>,
        config_version: impl Into<String>,
        op_steps: Vec<OpStep>,
        report_checksum: Option<String>,
        runtime_metrics: RuntimeMetrics,
        error: Option<AuditError>,
    ) {
        let record = AuditRecord {
            schema_version: SCHEMA_VERSION,
            timestamp_utc: Utc::now(),
            task_id: task_id.into(),
            agent_id: agent_id.into(),
            user_id,
            team,
            config_version: config_version.into(),
            op_steps,
            report_checksum,
            runtime_metrics,
            error,
        };
        info!(
            task_id = %record.task_id,
            agent_id = %record.agent_id,
            has_error = record.error.is_some(),
            "audit record"
        );
        let _ = self.tx.send(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn writes_one_file_per_record() {
        let dir = tempdir().unwrap();
        let logger = AuditLogger::new(dir.path().to_path_buf());

        logger.record(
            "task-1",
            "sheets-agent",
            None,
            Some("team-a".to_string()),
            "v1",
            vec![OpStep::now("lock_acquired"), OpStep::now("report_generated")],
            Some("deadbeef".to_string()),
            RuntimeMetrics {
                duration_ms: 120,
                tokens_in: None,
                tokens_out: None,
            },
            None,
        );

        // Give the background writer a chance to run.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let agent_dir = dir.path().join("sheets-agent");
        let entries: Vec<_> = std::fs::read_dir(&agent_dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
