use async_trait::async_trait;
use platform_core::PlatformResult;
use serde_json::Value;
use std::time::Duration;

/// Push/pop of typed JSON envelopes over named queues. A queue name is an
/// opaque string (e.g. `"inbox:sheets-agent"`); backends are responsible
/// for mapping it onto their own namespacing.
#[async_trait]
pub trait QueueAdapter: Send + Sync {
    /// Enqueues `envelope` onto `queue_name`.
    async fn push(&self, queue_name: &str, envelope: Value) -> PlatformResult<()>;

    /// Waits up to `timeout` for an item on `queue_name`, returning `None`
    /// if nothing arrives in time.
    async fn pop(&self, queue_name: &str, timeout: Duration) -> PlatformResult<Option<Value>>;
}
