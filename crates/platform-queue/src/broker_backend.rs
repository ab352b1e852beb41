use crate::adapter::QueueAdapter;
use async_trait::async_trait;
use futures_util::StreamExt;
use platform_core::{PlatformError, PlatformResult};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

const MAX_RECONNECT: u32 = 5;
const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(30);

/// List-based queue over a broker connection: `push` is an RPUSH, `pop` is
/// a blocking LPOP with the given timeout. `ConnectionManager` already
/// reconnects on dropped sockets; [`retry`](Self::retry) layers bounded
/// exponential backoff over that for transient command failures.
///
/// Also exposes `publish`/`subscribe` pub-sub helpers alongside push/pop,
/// for callers that want a fire-and-forget broadcast channel rather than a
/// durable queue.
pub struct BrokerQueueBackend {
    client: redis::Client,
    conn: ConnectionManager,
    prefix: String,
}

impl BrokerQueueBackend {
    pub async fn connect(url: &str, queue_prefix: impl Into<String>) -> PlatformResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| PlatformError::Queue(format!("invalid broker url: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| PlatformError::Queue(format!("broker connection failed: {e}")))?;
        Ok(Self {
            client,
            conn,
            prefix: queue_prefix.into(),
        })
    }

    fn key(&self, queue_name: &str) -> String {
        format!("{}:{}", self.prefix, queue_name)
    }

    async fn retry<T, F, Fut>(&self, mut op: F) -> PlatformResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = redis::RedisResult<T>>,
    {
        let mut delay = BASE_DELAY;
        let mut last_err = None;
        for attempt in 0..MAX_RECONNECT {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt + 1 < MAX_RECONNECT {
                        warn!(attempt = attempt + 1, %err, "broker command failed, retrying");
                        tokio::time::sleep(delay).await;
                        delay = (delay * 2).min(MAX_DELAY);
                    }
                    last_err = Some(err);
                }
            }
        }
        Err(PlatformError::Queue(format!(
            "broker unavailable after {MAX_RECONNECT} attempts: {}",
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Publishes `message` to `channel`. Channel names are not prefixed
    /// the way queue names are — pub/sub channels are a separate
    /// namespace from the list-backed queues.
    pub async fn publish(&self, channel: &str, message: Value) -> PlatformResult<()> {
        let payload = serde_json::to_string(&message)?;
        let conn = self.conn.clone();
        let channel = channel.to_string();
        self.retry(move || {
            let channel = channel.clone();
            let payload = payload.clone();
            let mut conn = conn.clone();
            async move { conn.publish::<_, _, ()>(channel, payload).await }
        })
        .await?;
        Ok(())
    }

    /// Opens a dedicated subscription to `channel`. Pub/sub requires its
    /// own connection distinct from the multiplexed [`ConnectionManager`]
    /// used by push/pop, so this dials a fresh connection each call.
    pub async fn subscribe(&self, channel: &str) -> PlatformResult<QueueSubscription> {
        let conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| PlatformError::Queue(format!("broker connection failed: {e}")))?;
        let mut pubsub = conn.into_pubsub();
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| PlatformError::Queue(format!("subscribe failed: {e}")))?;
        Ok(QueueSubscription { pubsub })
    }
}

/// A live subscription to one broker channel, yielding parsed JSON
/// messages as they are published.
pub struct QueueSubscription {
    pubsub: redis::aio::PubSub,
}

impl QueueSubscription {
    /// Waits for the next message on this channel. Returns `None` once
    /// the underlying connection closes.
    pub async fn next(&mut self) -> PlatformResult<Option<Value>> {
        match self.pubsub.on_message().next().await {
            Some(msg) => {
                let raw: String = msg
                    .get_payload()
                    .map_err(|e| PlatformError::Queue(format!("malformed pub/sub payload: {e}")))?;
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl QueueAdapter for BrokerQueueBackend {
    async fn push(&self, queue_name: &str, envelope: Value) -> PlatformResult<()> {
        let key = self.key(queue_name);
        let payload = serde_json::to_string(&envelope)?;
        let conn = self.conn.clone();
        self.retry(move || {
            let key = key.clone();
            let payload = payload.clone();
            let mut conn = conn.clone();
            async move { conn.rpush::<_, _, ()>(key, payload).await }
        })
        .await?;
        Ok(())
    }

    async fn pop(&self, queue_name: &str, timeout: Duration) -> PlatformResult<Option<Value>> {
        let key = self.key(queue_name);
        let timeout_secs = timeout.as_secs_f64().max(0.0);
        let conn = self.conn.clone();
        let result: Option<(String, String)> = self
            .retry(move || {
                let key = key.clone();
                let mut conn = conn.clone();
                async move { conn.blpop(key, timeout_secs).await }
            })
            .await?;
        match result {
            None => Ok(None),
            Some((_, raw)) => Ok(Some(serde_json::from_str(&raw)?)),
        }
    }
}
