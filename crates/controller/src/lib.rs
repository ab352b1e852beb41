//! The Controller: the single authorized writer of the coordination
//! document and the only component permitted to issue directives to
//! agents. Owns inbox processing, retry/escalation bookkeeping,
//! candidate review, and the system-wide health rollup.

pub mod candidate;
pub mod config;
pub mod directives;
pub mod engine;
pub mod inbox_scan;
pub mod retry_manager;

pub use config::ControllerConfig;
pub use engine::{ControllerEngine, CycleSummary, ProcessedReport, StateChangeRecord};
pub use retry_manager::RetryManager;
