use chrono::Utc;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::os::unix::fs::OpenOptionsExt;

use platform_core::compute_hash;

#[derive(Serialize)]
struct HashLogEntry<'a> {
    timestamp: chrono::DateTime<Utc>,
    hash: &'a str,
    operation: &'a str,
    request_id: &'a str,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

/// Computes SHA-256 content hashes and appends one JSON object per line to
/// a strictly append-only audit log, flushing and syncing every write.
pub struct HashManager {
    log_path: PathBuf,
}

impl HashManager {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
        }
    }

    /// `compute(value) = SHA-256(canonical-JSON(value))`.
    pub fn compute<T: Serialize>(&self, value: &T) -> serde_json::Result<String> {
        compute_hash(value)
    }

    /// Appends one audit record. `status` is `"ok"` on success or
    /// `"error"` paired with an error message on failure.
    pub fn log(
        &self,
        hash: &str,
        operation: &str,
        request_id: &str,
        status: &str,
        error: Option<&str>,
    ) -> std::io::Result<()> {
        if let Some(parent) = self.log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let entry = HashLogEntry {
            timestamp: Utc::now(),
            hash,
            operation,
            request_id,
            status,
            error,
        };
        let line = serde_json::to_string(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        append_line(&self.log_path, &line)
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o644)
        .open(path)?;
    writeln!(file, "{line}")?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn appends_one_line_per_call() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("audit_log.jsonl");
        let manager = HashManager::new(&log_path);

        let hash = manager.compute(&serde_json::json!({"a": 1})).unwrap();
        manager.log(&hash, "update", "req-1", "ok", None).unwrap();
        manager.log(&hash, "update", "req-2", "error", Some("boom")).unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
