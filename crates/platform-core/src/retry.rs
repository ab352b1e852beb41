use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a task is still within its retry budget or has been exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStatus {
    Retrying,
    Exhausted,
}

/// Per-task retry bookkeeping, persisted as a single JSON map keyed by
/// task id. Invariant: `retry_count <= max_retries`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryRecord {
    pub task_id: String,
    pub agent: String,
    pub team: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_retry_at: DateTime<Utc>,
    pub status: RetryStatus,
}

impl RetryRecord {
    /// Creates the first retry record for a task after its initial failure.
    pub fn first_failure(
        task_id: impl Into<String>,
        agent: impl Into<String>,
        team: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        let retry_count = 1;
        Self {
            task_id: task_id.into(),
            agent: agent.into(),
            team: team.into(),
            retry_count,
            max_retries,
            last_retry_at: Utc::now(),
            status: if retry_count >= max_retries {
                RetryStatus::Exhausted
            } else {
                RetryStatus::Retrying
            },
        }
    }

    /// Records one more failure: increments the counter, refreshes the
    /// timestamp, and flips to exhausted once the cap is reached.
    pub fn record_failure(&mut self) {
        self.retry_count += 1;
        self.last_retry_at = Utc::now();
        if self.retry_count >= self.max_retries {
            self.status = RetryStatus::Exhausted;
        }
    }

    /// True once `retry_count` has reached `max_retries`.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.status, RetryStatus::Exhausted)
    }
}
