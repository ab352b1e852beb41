use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::warn;

/// Atomic JSON read/write over arbitrary serializable records.
///
/// `save` writes to a sibling temp file in the same directory, flushes and
/// syncs it, then renames it over the target — so a reader never observes
/// a partially written file. `load` never raises: a missing or corrupt
/// file returns the caller-supplied default and logs a warning.
pub struct StateStore;

impl StateStore {
    /// Atomically persists `value` to `path`.
    pub fn save<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        Ok(())
    }

    /// Loads `path` as JSON, falling back to `default` on any read or parse
    /// failure (missing file, corrupt content). Never returns an error to
    /// the caller.
    pub fn load<T: DeserializeOwned>(path: &Path, default: T) -> T {
        let Ok(raw) = std::fs::read_to_string(path) else {
            return default;
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "corrupt state file, using default");
                default
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        count: u32,
    }

    #[test]
    fn round_trips_a_value() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        StateStore::save(&path, &Sample { count: 3 }).unwrap();
        let loaded = StateStore::load(&path, Sample { count: 0 });
        assert_eq!(loaded, Sample { count: 3 });
    }

    #[test]
    fn missing_file_returns_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let loaded = StateStore::load(&path, Sample { count: 9 });
        assert_eq!(loaded, Sample { count: 9 });
    }

    #[test]
    fn corrupt_file_returns_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corrupt.json");
        std::fs::write(&path, b"not json").unwrap();
        let loaded = StateStore::load(&path, Sample { count: 7 });
        assert_eq!(loaded, Sample { count: 7 });
    }
}
