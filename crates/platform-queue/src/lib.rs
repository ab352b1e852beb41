//! Queue abstraction decoupling agents from transport: push/pop of typed
//! JSON envelopes over named queues, backed by either the local filesystem
//! or a broker, chosen at startup by [`factory::get_queue_adapter`].

pub mod adapter;
pub mod broker_backend;
pub mod factory;
pub mod file_backend;

pub use adapter::QueueAdapter;
pub use broker_backend::{BrokerQueueBackend, QueueSubscription};
pub use factory::get_queue_adapter;
pub use file_backend::FileQueueBackend;
