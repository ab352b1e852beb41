use crate::adapter::QueueAdapter;
use crate::broker_backend::BrokerQueueBackend;
use crate::file_backend::FileQueueBackend;
use std::path::PathBuf;
use tracing::{info, warn};

/// Selects a queue backend from the process environment:
///
/// - `QUEUE_BROKER_ENABLED=true` and a reachable broker → [`BrokerQueueBackend`].
/// - `QUEUE_BROKER_ENABLED=true` but the broker is unreachable → falls back
///   to [`FileQueueBackend`] with a warning.
/// - unset or anything else → [`FileQueueBackend`].
pub async fn get_queue_adapter(base_dir: impl Into<PathBuf>) -> Box<dyn QueueAdapter> {
    let base_dir = base_dir.into();
    let broker_enabled = std::env::var("QUEUE_BROKER_ENABLED")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if !broker_enabled {
        return Box::new(FileQueueBackend::new(base_dir));
    }

    let url = std::env::var("QUEUE_BROKER_URL")
        .unwrap_or_else(|_| "redis://localhost:6379/0".to_string());
    let prefix = std::env::var("QUEUE_BROKER_PREFIX").unwrap_or_else(|_| "tasks".to_string());

    match BrokerQueueBackend::connect(&url, prefix).await {
        Ok(backend) => {
            info!(url = %url, "using broker queue adapter");
            Box::new(backend)
        }
        Err(err) => {
            warn!(error = %err, "broker queue adapter unavailable, falling back to file backend");
            Box::new(FileQueueBackend::new(base_dir))
        }
    }
}
