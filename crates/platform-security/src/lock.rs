use fs2::FileExt;
use platform_core::{LockRecord, PlatformError, PlatformResult};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

/// Pluggable storage for lock records. A [`LockManager`] is backend-agnostic;
/// the file backend below maps directly onto advisory file locks (`flock`),
/// while a distributed backend (an atomic SET-NX-EX plus a compare-and-delete
/// release) can be swapped in behind the same three operations. Backend
/// calls are synchronous: the file backend never blocks meaningfully, and
/// the reference distributed backend treats connection failures on
/// acquisition as "not acquired" (letting the manager retry) rather than
/// surfacing a network error.
pub trait LockBackend: Send + Sync {
    fn try_acquire(
        &self,
        resource_id: &str,
        owner: &str,
        task_id: Option<&str>,
        timeout_seconds: i64,
    ) -> bool;

    fn release(&self, resource_id: &str, owner: &str);

    fn read_info(&self, resource_id: &str) -> Option<LockRecord>;
}

/// File-based lock backend using OS-level advisory locks (`flock`).
///
/// Lock file path: `{locks_dir}/{prefix}{safe_key}.lock`. A lock file's
/// content is the JSON-serialized [`LockRecord`]. A lock older than
/// `timeout_seconds` is considered stale and may be overwritten by the
/// next claimant; same-owner re-acquisition always refreshes the
/// timestamp.
pub struct FileLockBackend {
    locks_dir: PathBuf,
    prefix: String,
}

impl FileLockBackend {
    pub fn new(locks_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            locks_dir: locks_dir.into(),
            prefix: prefix.into(),
        }
    }

    fn lock_path(&self, resource_id: &str) -> PathBuf {
        let safe_key = LockRecord::safe_key(resource_id);
        self.locks_dir.join(format!("{}{}.lock", self.prefix, safe_key))
    }

    fn write_lock(path: &Path, record: &LockRecord) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.lock_exclusive()?;
        let json = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        file.write_all(json.as_bytes())?;
        FileExt::unlock(&file)?;
        Ok(())
    }

    fn read_lock(path: &Path) -> Option<LockRecord> {
        let mut file = OpenOptions::new().read(true).open(path).ok()?;
        file.lock_shared().ok()?;
        let mut contents = String::new();
        let read_result = file.read_to_string(&mut contents);
        let _ = FileExt::unlock(&file);
        read_result.ok()?;
        serde_json::from_str(&contents).ok()
    }
}

impl LockBackend for FileLockBackend {
    fn try_acquire(
        &self,
        resource_id: &str,
        owner: &str,
        task_id: Option<&str>,
        timeout_seconds: i64,
    ) -> bool {
        let path = self.lock_path(resource_id);
        let record = LockRecord::new(resource_id, owner, task_id.map(str::to_string));

        if std::fs::create_dir_all(&self.locks_dir).is_err() {
            return false;
        }

        if !path.exists() {
            return Self::write_lock(&path, &record).is_ok();
        }

        match Self::read_lock(&path) {
            // Same-owner re-acquisition always refreshes the timestamp.
            Some(existing) if existing.owner == owner => Self::write_lock(&path, &record).is_ok(),
            Some(existing) if existing.is_stale(timeout_seconds) => {
                Self::write_lock(&path, &record).is_ok()
            }
            Some(_) => false,
            // Unreadable lock file — treat as stale, as the reference
            // backend does when it cannot parse the contents.
            None => Self::write_lock(&path, &record).is_ok(),
        }
    }

    fn release(&self, resource_id: &str, _owner: &str) {
        let _ = std::fs::remove_file(self.lock_path(resource_id));
    }

    fn read_info(&self, resource_id: &str) -> Option<LockRecord> {
        Self::read_lock(&self.lock_path(resource_id))
    }
}

/// A guard returned by [`LockManager::acquire`]. Releasing happens in
/// `Drop` so the lock is never leaked on an error path or an unwinding
/// panic — the Rust expression of the source's `acquire … finally release`
/// discipline.
pub struct LockGuard<'a> {
    manager: &'a LockManager,
    resource_id: String,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.manager.release_now(&self.resource_id);
    }
}

/// Backend-agnostic lock manager with bounded exponential-backoff retries.
pub struct LockManager {
    owner: String,
    timeout_seconds: i64,
    max_retries: u32,
    backoff_base: f64,
    backend: Box<dyn LockBackend>,
    held: Mutex<HashSet<String>>,
}

impl LockManager {
    pub fn new(
        owner: impl Into<String>,
        timeout_seconds: i64,
        max_retries: u32,
        backoff_base: f64,
        backend: Box<dyn LockBackend>,
    ) -> Self {
        Self {
            owner: owner.into(),
            timeout_seconds,
            max_retries,
            backoff_base,
            backend,
            held: Mutex::new(HashSet::new()),
        }
    }

    /// Convenience constructor over [`FileLockBackend`].
    pub fn with_file_backend(
        owner: impl Into<String>,
        locks_dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        timeout_seconds: i64,
        max_retries: u32,
        backoff_base: f64,
    ) -> Self {
        Self::new(
            owner,
            timeout_seconds,
            max_retries,
            backoff_base,
            Box::new(FileLockBackend::new(locks_dir, prefix)),
        )
    }

    /// Attempts to claim `resource_id`, retrying with base-2 exponential
    /// backoff up to `max_retries` times before failing with a
    /// [`PlatformError::Lock`].
    pub async fn acquire(
        &self,
        resource_id: &str,
        task_id: Option<&str>,
    ) -> PlatformResult<LockGuard<'_>> {
        for attempt in 0..=self.max_retries {
            if self
                .backend
                .try_acquire(resource_id, &self.owner, task_id, self.timeout_seconds)
            {
                self.held_set().insert(resource_id.to_string());
                return Ok(LockGuard {
                    manager: self,
                    resource_id: resource_id.to_string(),
                });
            }
            if attempt < self.max_retries {
                let delay = self.backoff_base * 2f64.powi(attempt as i32);
                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            }
        }
        warn!(resource_id, owner = %self.owner, "lock contended past retry budget");
        Err(PlatformError::Lock(format!(
            "cannot acquire lock for {resource_id} after {} retries",
            self.max_retries
        )))
    }

    fn held_set(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release_now(&self, resource_id: &str) {
        if self.held_set().remove(resource_id) {
            self.backend.release(resource_id, &self.owner);
        }
    }

    /// Releases `resource_id` if this manager holds it; no-op otherwise.
    pub fn release(&self, resource_id: &str) {
        self.release_now(resource_id);
    }

    /// Releases everything this instance currently holds.
    pub fn release_all(&self) {
        let ids: Vec<String> = self.held_set().iter().cloned().collect();
        for id in ids {
            self.release(&id);
        }
    }

    pub fn is_held(&self, resource_id: &str) -> bool {
        self.held_set().contains(resource_id)
    }

    pub fn check(&self, resource_id: &str) -> Option<LockRecord> {
        self.backend.read_info(resource_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn acquire_then_release_frees_the_resource() {
        let dir = tempdir().unwrap();
        let manager = LockManager::with_file_backend("controller-1", dir.path(), "", 60, 3, 0.01);
        {
            let _guard = manager.acquire("sheet-1", None).await.unwrap();
            assert!(manager.is_held("sheet-1"));
        }
        assert!(!manager.is_held("sheet-1"));
    }

    #[tokio::test]
    async fn second_owner_is_blocked_by_fresh_lock() {
        let dir = tempdir().unwrap();
        let first = LockManager::with_file_backend("owner-a", dir.path(), "", 60, 0, 0.01);
        let second = LockManager::with_file_backend("owner-b", dir.path(), "", 60, 0, 0.01);

        let _guard = first.acquire("sheet-1", None).await.unwrap();
        let result = second.acquire("sheet-1", None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn stale_lock_is_overridden() {
        let dir = tempdir().unwrap();
        let first = LockManager::with_file_backend("owner-a", dir.path(), "", 0, 0, 0.0);
        let second = LockManager::with_file_backend("owner-b", dir.path(), "", 0, 0, 0.0);

        let guard = first.acquire("sheet-1", None).await.unwrap();
        std::mem::forget(guard); // simulate a crashed holder that never released

        tokio::time::sleep(Duration::from_millis(10)).await;
        let result = second.acquire("sheet-1", None).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn same_owner_reacquisition_refreshes_timestamp() {
        let dir = tempdir().unwrap();
        let manager = LockManager::with_file_backend("owner-a", dir.path(), "", 60, 0, 0.0);
        let guard1 = manager.acquire("sheet-1", None).await.unwrap();
        drop(guard1);
        let guard2 = manager.acquire("sheet-1", None).await;
        assert!(guard2.is_ok());
    }
}
