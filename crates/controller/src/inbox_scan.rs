//! Inbox discovery: recursive scan for unprocessed report files, with
//! team derivation from the first path segment under the inbox root.

use std::path::{Path, PathBuf};

/// One report file found under the inbox tree, with its team already
/// derived from the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxEntry {
    pub path: PathBuf,
    pub team: String,
}

/// Recursively scans `inbox_root` for `.json` files, excluding anything
/// ending in `.processed.json` or `.hash`, any path containing
/// `/controller/` (the Controller's own self-reports), and any path
/// containing `/examples/`. When `team_filter` is set, only that team's
/// subtree is scanned.
pub fn scan_inbox(inbox_root: &Path, team_filter: Option<&str>) -> Vec<InboxEntry> {
    let mut results = Vec::new();
    let Ok(entries) = std::fs::read_dir(inbox_root) else {
        return results;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let team = path.file_name().and_then(|n| n.to_str()).unwrap_or("").to_string();
        if team.is_empty() || team == "controller" {
            continue;
        }
        if let Some(filter) = team_filter {
            if team != filter {
                continue;
            }
        }
        walk(&path, &team, &mut results);
    }

    results.sort_by(|a, b| a.path.cmp(&b.path));
    results
}

fn walk(dir: &Path, team: &str, out: &mut Vec<InboxEntry>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk(&path, team, out);
            continue;
        }
        if !is_eligible(&path) {
            continue;
        }
        out.push(InboxEntry { path, team: team.to_string() });
    }
}

fn is_eligible(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if !name.ends_with(".json") {
        return false;
    }
    if name.ends_with(".processed.json") || name.ends_with(".hash") {
        return false;
    }
    if path.to_string_lossy().contains("examples") {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn finds_unprocessed_reports_and_derives_team() {
        let dir = tempdir().unwrap();
        let agent_dir = dir.path().join("sheets-team").join("sheets-agent");
        std::fs::create_dir_all(&agent_dir).unwrap();
        std::fs::write(agent_dir.join("20260224T103300Z_report.json"), "{}").unwrap();
        std::fs::write(agent_dir.join("20260224T103200Z_report.processed.json"), "{}").unwrap();
        std::fs::write(agent_dir.join("20260224T103300Z_report.json.hash"), "deadbeef").unwrap();

        let found = scan_inbox(dir.path(), None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].team, "sheets-team");
    }

    #[test]
    fn excludes_the_controller_self_report_directory() {
        let dir = tempdir().unwrap();
        let controller_dir = dir.path().join("controller");
        std::fs::create_dir_all(&controller_dir).unwrap();
        std::fs::write(controller_dir.join("20260224T103300Z_self_report.json"), "{}").unwrap();

        assert!(scan_inbox(dir.path(), None).is_empty());
    }

    #[test]
    fn team_filter_scopes_the_scan() {
        let dir = tempdir().unwrap();
        for team in ["sheets-team", "auth-team"] {
            let agent_dir = dir.path().join(team).join("agent");
            std::fs::create_dir_all(&agent_dir).unwrap();
            std::fs::write(agent_dir.join("20260224T103300Z_report.json"), "{}").unwrap();
        }

        let found = scan_inbox(dir.path(), Some("auth-team"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].team, "auth-team");
    }
}
