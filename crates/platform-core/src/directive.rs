use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::compute_hash;

/// A command a [`Directive`] instructs its target to perform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DirectiveCommand {
    RetryTask {
        original_task_id: String,
        retry_count: u32,
        max_retries: u32,
    },
    Escalate {
        original_task_id: String,
        failed_agent: String,
        team: String,
        retry_count: u32,
        reason: String,
    },
    ExecuteApprovedChange {
        candidate_id: String,
        proposed_changes: Vec<serde_json::Value>,
    },
}

/// A structured command emitted by the Controller to an agent or operator.
///
/// `signature` is a SHA-256 hex digest over the canonical JSON of every
/// field except itself, reproducible by any holder of the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directive {
    pub directive_id: String,
    pub target_agent: String,
    #[serde(flatten)]
    pub command: DirectiveCommand,
    pub issued_by: String,
    pub issued_at: DateTime<Utc>,
    pub signature: String,
}

#[derive(Serialize)]
struct SignaturePayload<'a> {
    directive_id: &'a str,
    target_agent: &'a str,
    #[serde(flatten)]
    command: &'a DirectiveCommand,
}

impl Directive {
    /// Builds a directive, computing its signature over the canonical
    /// payload (directive_id, target_agent, command) before stamping the
    /// issuer and timestamp.
    pub fn new(
        directive_id: impl Into<String>,
        target_agent: impl Into<String>,
        command: DirectiveCommand,
        issued_by: impl Into<String>,
    ) -> serde_json::Result<Self> {
        let directive_id = directive_id.into();
        let target_agent = target_agent.into();
        let payload = SignaturePayload {
            directive_id: &directive_id,
            target_agent: &target_agent,
            command: &command,
        };
        let signature = compute_hash(&payload)?;
        Ok(Self {
            directive_id,
            target_agent,
            command,
            issued_by: issued_by.into(),
            issued_at: Utc::now(),
            signature,
        })
    }

    /// Recomputes the signature and compares it to the stored one.
    pub fn verify_signature(&self) -> serde_json::Result<bool> {
        let payload = SignaturePayload {
            directive_id: &self.directive_id,
            target_agent: &self.target_agent,
            command: &self.command,
        };
        let expected = compute_hash(&payload)?;
        Ok(expected == self.signature)
    }
}
