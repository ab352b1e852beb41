use crate::apply::apply_state_changes;
use crate::backup::{backup_state, compute_state_checksum, restore_state, verify_state, VerifyResult};
use crate::document::{parse_state, render_state, StateDocument};
use crate::models::{HealthStatus, StateHealth, StateUpdateRequest, StateUpdateResult};
use crate::validator::StateValidator;
use chrono::Utc;
use platform_core::{PlatformError, PlatformResult};
use platform_security::{HashManager, LockManager};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Only the Controller is permitted to update the coordination document.
pub const AUTHORIZED_ORIGIN: &str = "controller";

/// Owns the coordination document's full lifecycle: locking, backup,
/// validation, atomic persistence, and the ambient health/changelog/mistake
/// logs that accompany every write.
pub struct StateManager {
    state_path: PathBuf,
    backup_dir: PathBuf,
    health_path: PathBuf,
    changelog_path: PathBuf,
    mistake_path: PathBuf,
    lock: LockManager,
    hash_manager: HashManager,
}

impl StateManager {
    pub fn new(
        state_path: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
        locks_dir: impl Into<PathBuf>,
        health_path: impl Into<PathBuf>,
        changelog_path: impl Into<PathBuf>,
        mistake_path: impl Into<PathBuf>,
        audit_log_path: impl Into<PathBuf>,
        lock_timeout_seconds: i64,
    ) -> Self {
        Self {
            state_path: state_path.into(),
            backup_dir: backup_dir.into(),
            health_path: health_path.into(),
            changelog_path: changelog_path.into(),
            mistake_path: mistake_path.into(),
            lock: LockManager::with_file_backend(
                "state-manager",
                locks_dir,
                "state_",
                lock_timeout_seconds,
                0,
                0.0,
            ),
            hash_manager: HashManager::new(audit_log_path),
        }
    }

    pub fn load_state(&self) -> PlatformResult<StateDocument> {
        let content = std::fs::read_to_string(&self.state_path)?;
        Ok(parse_state(&content))
    }

    /// Renders and atomically writes the document, then writes its
    /// checksum to the `.md.hash` companion file. Returns the checksum.
    pub fn save_state(&self, doc: &StateDocument) -> PlatformResult<String> {
        let content = render_state(doc);
        let checksum = compute_state_checksum(&content);

        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let parent = self.state_path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.state_path)
            .map_err(|e| PlatformError::Io(std::io::Error::other(e)))?;

        let hash_path = self.state_path.with_extension("md.hash");
        std::fs::write(&hash_path, format!("{checksum}\n"))?;

        Ok(checksum)
    }

    pub fn backup_state(&self) -> PlatformResult<PathBuf> {
        Ok(backup_state(&self.state_path, &self.backup_dir)?)
    }

    pub fn restore_state(&self, backup_path: &Path) -> PlatformResult<()> {
        restore_state(&self.state_path, backup_path)?;
        info!(backup = %backup_path.display(), "state restored from backup");
        Ok(())
    }

    pub fn verify_integrity(&self) -> VerifyResult {
        verify_state(&self.state_path)
    }

    /// The authoritative document pipeline (see the module docs): acquire
    /// → backup → load → validate → apply → save → log hash → append
    /// health → append changelog → release. Any failure before the save
    /// step restores the pre-update backup, logs a mistake entry, and
    /// marks health degraded; the lock is released on every path.
    pub async fn update_state(&self, request: StateUpdateRequest) -> PlatformResult<StateUpdateResult> {
        if request.origin != AUTHORIZED_ORIGIN {
            return Err(PlatformError::Unauthorized(format!(
                "state updates must originate from '{AUTHORIZED_ORIGIN}', got '{}'",
                request.origin
            )));
        }

        let _guard = self.lock.acquire("state-document", Some(&request.request_id.to_string())).await?;

        let backup_path = if self.state_path.exists() {
            Some(self.backup_state()?)
        } else {
            None
        };

        let result = self.run_update(&request).await;

        match result {
            Ok(state_hash) => Ok(StateUpdateResult {
                success: true,
                request_id: request.request_id,
                state_hash,
                errors: Vec::new(),
                timestamp: Utc::now(),
            }),
            Err(err) => {
                self.handle_error(backup_path.as_deref(), &request.request_id.to_string(), &err.to_string());
                Ok(StateUpdateResult {
                    success: false,
                    request_id: request.request_id,
                    state_hash: String::new(),
                    errors: vec![err.to_string()],
                    timestamp: Utc::now(),
                })
            }
        }
    }

    async fn run_update(&self, request: &StateUpdateRequest) -> PlatformResult<String> {
        let mut current = self.load_state()?;

        let validation = StateValidator::validate_change(&current, &request.changes);
        if !validation.valid {
            return Err(PlatformError::Validation(validation.errors.join("; ")));
        }

        apply_state_changes(&mut current, &request.changes);
        let state_hash = self.save_state(&current)?;
        let _ = self.hash_manager.log(&state_hash, "update", &request.request_id.to_string(), "ok", None);

        self.append_health(HealthStatus::Healthy, &state_hash, &[]);
        self.append_changelog(request, request.changes.len());

        Ok(state_hash)
    }

    fn handle_error(&self, backup_path: Option<&Path>, request_id: &str, error_msg: &str) {
        if let Some(path) = backup_path {
            if let Err(restore_err) = self.restore_state(path) {
                error!(error = %restore_err, "backup restore failed after update error");
            }
        }
        let _ = self.hash_manager.log("", "update", request_id, "error", Some(error_msg));
        self.append_mistake(request_id, error_msg);
        self.append_health(HealthStatus::Degraded, "", &[error_msg.to_string()]);
    }

    fn append_health(&self, status: HealthStatus, state_hash: &str, errors: &[String]) {
        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "status": status,
            "state_hash": state_hash,
            "errors": errors,
        });
        if let Err(err) = safe_append(&self.health_path, &format!("{entry}\n")) {
            warn!(error = %err, "failed to append health entry");
        }
    }

    fn append_changelog(&self, request: &StateUpdateRequest, change_count: usize) {
        let entry = format!(
            "\n## [{}] {}\n- **operation**: state_update\n- **origin**: {}\n- **changes**: {change_count}\n- **reason**: {}\n",
            Utc::now().to_rfc3339(),
            request.request_id,
            request.origin,
            request.reason,
        );
        if let Err(err) = safe_append(&self.changelog_path, &entry) {
            warn!(error = %err, "failed to append changelog entry");
        }
    }

    fn append_mistake(&self, request_id: &str, error_msg: &str) {
        let entry = format!(
            "\n## [{}] {request_id}\n- **error**: {error_msg}\n- **operation**: state_update\n- **remediation**: Review change validity and retry\n",
            Utc::now().to_rfc3339(),
        );
        if let Err(err) = safe_append(&self.mistake_path, &entry) {
            warn!(error = %err, "failed to append mistake entry");
        }
    }

    pub fn health_check(&self) -> StateHealth {
        let now = Utc::now();

        if !self.state_path.exists() {
            return StateHealth {
                status: HealthStatus::Down,
                last_check: now,
                last_update: None,
                state_hash: String::new(),
                errors: vec!["STATE.md not found".to_string()],
            };
        }

        let Ok(content) = std::fs::read_to_string(&self.state_path) else {
            return StateHealth {
                status: HealthStatus::Down,
                last_check: now,
                last_update: None,
                state_hash: String::new(),
                errors: vec!["failed to read STATE.md".to_string()],
            };
        };
        let state_hash = compute_state_checksum(&content);

        let verify = self.verify_integrity();
        if !verify.ok {
            return StateHealth {
                status: HealthStatus::Degraded,
                last_check: now,
                last_update: None,
                state_hash,
                errors: verify.errors,
            };
        }

        let doc = parse_state(&content);
        let last_update = chrono::DateTime::parse_from_rfc3339(&doc.last_updated)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));

        StateHealth {
            status: HealthStatus::Healthy,
            last_check: now,
            last_update,
            state_hash,
            errors: Vec::new(),
        }
    }
}

fn safe_append(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StateChangeItem;
    use tempfile::tempdir;

    fn manager(dir: &Path) -> StateManager {
        StateManager::new(
            dir.join("STATE.md"),
            dir.join("backups"),
            dir.join("locks"),
            dir.join("HEALTH.md"),
            dir.join("CHANGELOG.md"),
            dir.join("MISTAKE.md"),
            dir.join("audit.jsonl"),
            5,
        )
    }

    fn request(changes: Vec<StateChangeItem>) -> StateUpdateRequest {
        StateUpdateRequest {
            origin: "controller".to_string(),
            changes,
            reason: "test update".to_string(),
            request_id: uuid::Uuid::new_v4(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn unauthorized_origin_is_rejected_before_touching_disk() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());
        let mut req = request(vec![]);
        req.origin = "some-agent".to_string();

        let result = manager.update_state(req).await;
        assert!(result.is_err());
        assert!(!dir.path().join("STATE.md").exists());
    }

    #[tokio::test]
    async fn successful_update_writes_state_and_companion_hash() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());
        manager.save_state(&StateDocument::initial()).unwrap();

        let req = request(vec![StateChangeItem {
            section: "agent_status".to_string(),
            field: "sheets-agent".to_string(),
            column: "Status".to_string(),
            old_value: "—".to_string(),
            new_value: "idle".to_string(),
            reason: "startup".to_string(),
            triggered_by: "req-1".to_string(),
        }]);

        let result = manager.update_state(req).await.unwrap();
        assert!(result.success);
        assert!(dir.path().join("STATE.md.hash").exists());
        assert!(dir.path().join("CHANGELOG.md").exists());
    }

    #[tokio::test]
    async fn invalid_change_restores_backup_and_logs_mistake() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());
        manager.save_state(&StateDocument::initial()).unwrap();
        let before = std::fs::read_to_string(dir.path().join("STATE.md")).unwrap();

        let req = request(vec![]); // empty changes -> validation error
        let result = manager.update_state(req).await.unwrap();
        assert!(!result.success);

        let after = std::fs::read_to_string(dir.path().join("STATE.md")).unwrap();
        assert_eq!(before, after);
        assert!(dir.path().join("MISTAKE.md").exists());
    }

    #[tokio::test]
    async fn health_check_reports_healthy_for_a_fresh_document() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());
        manager.save_state(&StateDocument::initial()).unwrap();

        let health = manager.health_check();
        assert_eq!(health.status, HealthStatus::Healthy);
    }
}
