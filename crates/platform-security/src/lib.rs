//! Durable, crash-safe storage primitives: atomic state persistence,
//! advisory file locking, rate limiting, hash-chained integrity logging,
//! and per-agent audit records.
//!
//! Every write in this crate goes through the same atomic pattern — write
//! to a sibling temp file, `fsync`, then rename over the target — so a
//! reader never observes a half-written file, even across a crash.

/// Per-agent audit records.
pub mod audit;
/// SHA-256 content hashing and its append-only log.
pub mod hash_log;
/// Advisory file locking with RAII guards.
pub mod lock;
/// Persisted sliding-window rate limiting.
pub mod rate_limit;
/// Atomic JSON read/write.
pub mod state_store;

pub use audit::{AuditError, AuditLogger, AuditRecord, OpStep, RuntimeMetrics};
pub use hash_log::HashManager;
pub use lock::{FileLockBackend, LockBackend, LockGuard, LockManager};
pub use rate_limit::{RateLimiter, Remaining};
pub use state_store::StateStore;
