//! Shared record types, error taxonomy, and hashing primitives for the
//! coordination platform.
//!
//! Every other crate in the workspace builds on the types defined here:
//! the task/report/directive/candidate/retry/lock records that flow
//! through the Controller and its agents, plus the canonical-JSON hashing
//! used for checksums and directive signatures.

pub mod candidate;
pub mod directive;
pub mod error;
pub mod hash;
pub mod lock;
pub mod report;
pub mod retry;
pub mod task;

pub use candidate::{CandidateRecord, CandidateStatus, ReviewDecision};
pub use directive::{Directive, DirectiveCommand};
pub use error::{PlatformError, PlatformResult};
pub use hash::{canonical_json, compute_hash};
pub use lock::{LockNamespace, LockRecord};
pub use report::{ProposedChange, Report, ReportMetrics, ReportStatus, Risk, ValidationEntry};
pub use retry::{RetryRecord, RetryStatus};
pub use task::{Priority, RequestPayload, SheetChange, SheetRef, TaskEnvelope, TaskMetadata};
