use crate::adapter::QueueAdapter;
use async_trait::async_trait;
use platform_core::PlatformResult;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// File-backed FIFO queue: one directory per queue, one JSON file per item,
/// named `<timestamp>-<seq>.json` so lexicographic order is creation order.
/// `pop` polls at [`POLL_INTERVAL`] until an item appears or the timeout
/// elapses. Ordering is best-effort FIFO within one process; across
/// processes it is by timestamp with this process's counter as a tiebreak.
pub struct FileQueueBackend {
    base_dir: PathBuf,
    counter: AtomicU64,
}

impl FileQueueBackend {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            counter: AtomicU64::new(0),
        }
    }

    fn queue_dir(&self, queue_name: &str) -> PathBuf {
        let safe = queue_name.replace([':', '/'], "_");
        self.base_dir.join(safe)
    }

    async fn try_pop(&self, queue_name: &str) -> Option<Value> {
        let dir = self.queue_dir(queue_name);
        let mut entries = tokio::fs::read_dir(&dir).await.ok()?;
        let mut files = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
        files.sort();
        let oldest = files.into_iter().next()?;

        let contents = tokio::fs::read_to_string(&oldest).await.ok()?;
        match serde_json::from_str(&contents) {
            Ok(value) => {
                let _ = tokio::fs::remove_file(&oldest).await;
                Some(value)
            }
            Err(err) => {
                warn!(path = %oldest.display(), error = %err, "failed to parse queue file");
                let _ = tokio::fs::remove_file(&oldest).await;
                None
            }
        }
    }
}

#[async_trait]
impl QueueAdapter for FileQueueBackend {
    async fn push(&self, queue_name: &str, envelope: Value) -> PlatformResult<()> {
        let dir = self.queue_dir(queue_name);
        tokio::fs::create_dir_all(&dir).await?;

        let ts = chrono::Utc::now().format("%Y%m%dT%H%M%S%6f");
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("{ts}-{seq:06}.json"));
        let tmp = path.with_extension("tmp");

        let json = serde_json::to_string_pretty(&envelope)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn pop(&self, queue_name: &str, timeout: Duration) -> PlatformResult<Option<Value>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(value) = self.try_pop(queue_name).await {
                return Ok(Some(value));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - Instant::now())).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn push_then_pop_round_trips() {
        let dir = tempdir().unwrap();
        let queue = FileQueueBackend::new(dir.path());
        queue.push("inbox:sheets", json!({"task_id": "t1"})).await.unwrap();

        let item = queue
            .pop("inbox:sheets", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(item, Some(json!({"task_id": "t1"})));
    }

    #[tokio::test]
    async fn pop_times_out_on_empty_queue() {
        let dir = tempdir().unwrap();
        let queue = FileQueueBackend::new(dir.path());
        let item = queue
            .pop("inbox:empty", Duration::from_millis(150))
            .await
            .unwrap();
        assert_eq!(item, None);
    }

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let dir = tempdir().unwrap();
        let queue = FileQueueBackend::new(dir.path());
        queue.push("q", json!({"n": 1})).await.unwrap();
        queue.push("q", json!({"n": 2})).await.unwrap();
        queue.push("q", json!({"n": 3})).await.unwrap();

        let first = queue.pop("q", Duration::from_secs(1)).await.unwrap();
        let second = queue.pop("q", Duration::from_secs(1)).await.unwrap();
        assert_eq!(first, Some(json!({"n": 1})));
        assert_eq!(second, Some(json!({"n": 2})));
    }
}
