//! Agent health classification: parses each agent's health file,
//! classifies it healthy/degraded/down/unknown by consecutive-failure
//! count and silence, rolls the worst class up to a system-wide status,
//! and scans the locks directory and inbox tree for ambient observability.

pub mod classify;
pub mod monitor;
pub mod parse;

pub use classify::{classify, worst, HealthClass, HealthSnapshot, Thresholds};
pub use monitor::{HealthMonitor, SystemHealthSummary};
pub use parse::parse_health_file;
