use crate::classify::HealthSnapshot;
use std::path::Path;

/// Parses the trailing entry of an agent's health file: one JSON object
/// per line (the same format the agent runner appends to on every cycle,
/// see `agent-runtime::runner`), last line wins. Tolerant: a missing file,
/// an empty file, or a trailing line that fails to parse all yield `None`
/// rather than an error — the caller classifies that as [`crate::classify::HealthClass::Unknown`].
pub fn parse_health_file(path: &Path) -> Option<HealthSnapshot> {
    let contents = std::fs::read_to_string(path).ok()?;
    let last_line = contents.lines().rev().find(|l| !l.trim().is_empty())?;
    serde_json::from_str(last_line).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_the_last_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("health.jsonl");
        std::fs::write(
            &path,
            "{\"last_run\":\"2026-01-01T00:00:00Z\",\"status\":\"error\",\"consecutive_failures\":1}\n\
             {\"last_run\":\"2026-01-01T00:05:00Z\",\"status\":\"success\",\"consecutive_failures\":0}\n",
        )
        .unwrap();

        let snapshot = parse_health_file(&path).unwrap();
        assert_eq!(snapshot.status, "success");
        assert_eq!(snapshot.consecutive_failures, 0);
    }

    #[test]
    fn missing_file_returns_none() {
        let dir = tempdir().unwrap();
        assert!(parse_health_file(&dir.path().join("missing.jsonl")).is_none());
    }

    #[test]
    fn corrupt_trailing_line_returns_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("health.jsonl");
        std::fs::write(&path, "not json\n").unwrap();
        assert!(parse_health_file(&path).is_none());
    }
}
