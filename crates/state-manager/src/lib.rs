//! The authoritative document pipeline: the coordination platform's single
//! source of truth is a markdown document (frontmatter + typed tables +
//! a JSON metrics block), owned exclusively by the Controller and updated
//! through one locked, backed-up, validated, audited write path.

pub mod apply;
pub mod backup;
pub mod document;
pub mod manager;
pub mod models;
pub mod rebuild;
pub mod validator;

pub use apply::apply_state_changes;
pub use backup::{backup_state, compute_state_checksum, restore_state, verify_state, VerifyResult};
pub use document::{parse_state, render_state, Row, StateDocument};
pub use manager::{StateManager, AUTHORIZED_ORIGIN};
pub use models::{
    HealthStatus, StateChangeItem, StateHealth, StateUpdateRequest, StateUpdateResult, ValidationResult,
};
pub use rebuild::rebuild_state;
pub use validator::StateValidator;
