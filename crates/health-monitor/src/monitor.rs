use crate::classify::{classify, worst, HealthClass, Thresholds};
use crate::parse::parse_health_file;
use chrono::Utc;
use platform_security::StateStore;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Per-agent classification plus the system-wide rollup and ambient
/// filesystem observations (active lock count, inbox queue depth),
/// serialized to `system_health.json` for downstream consumers.
#[derive(Debug, Clone, Serialize)]
pub struct SystemHealthSummary {
    pub checked_at: chrono::DateTime<Utc>,
    pub agents: HashMap<String, HealthClass>,
    pub system_status: HealthClass,
    pub active_locks: usize,
    pub queue_depth: usize,
}

/// Classifies every configured agent from its health file and rolls the
/// result up into a system-wide summary.
pub struct HealthMonitor {
    agent_health_paths: HashMap<String, PathBuf>,
    locks_dir: PathBuf,
    inbox_dir: PathBuf,
    summary_path: PathBuf,
    thresholds: Thresholds,
}

impl HealthMonitor {
    pub fn new(
        agent_health_paths: HashMap<String, PathBuf>,
        locks_dir: impl Into<PathBuf>,
        inbox_dir: impl Into<PathBuf>,
        summary_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            agent_health_paths,
            locks_dir: locks_dir.into(),
            inbox_dir: inbox_dir.into(),
            summary_path: summary_path.into(),
            thresholds: Thresholds::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn check_agent(&self, agent: &str) -> HealthClass {
        let Some(path) = self.agent_health_paths.get(agent) else {
            return HealthClass::Unknown;
        };
        let snapshot = parse_health_file(path);
        classify(snapshot.as_ref(), Utc::now(), self.thresholds)
    }

    /// Agents currently classified `down` — the set the Controller escalates
    /// for.
    pub fn down_agents(&self) -> Vec<String> {
        self.agent_health_paths
            .keys()
            .filter(|agent| self.check_agent(agent) == HealthClass::Down)
            .cloned()
            .collect()
    }

    fn count_locks(&self) -> usize {
        std::fs::read_dir(&self.locks_dir)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("lock"))
                    .count()
            })
            .unwrap_or(0)
    }

    fn count_queue_depth(&self) -> usize {
        fn walk(dir: &Path, count: &mut usize) {
            let Ok(entries) = std::fs::read_dir(dir) else {
                return;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    walk(&path, count);
                } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
                    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                    if !name.ends_with(".processed.json") {
                        *count += 1;
                    }
                }
            }
        }
        let mut count = 0;
        walk(&self.inbox_dir, &mut count);
        count
    }

    /// Runs a full system-wide check and returns the summary. Does not
    /// persist it; see [`Self::check_and_persist`].
    pub fn check_system(&self) -> SystemHealthSummary {
        let agents: HashMap<String, HealthClass> = self
            .agent_health_paths
            .keys()
            .map(|name| (name.clone(), self.check_agent(name)))
            .collect();
        let system_status = worst(agents.values().copied());

        SystemHealthSummary {
            checked_at: Utc::now(),
            agents,
            system_status,
            active_locks: self.count_locks(),
            queue_depth: self.count_queue_depth(),
        }
    }

    /// Runs [`Self::check_system`] and atomically persists it to the
    /// configured summary path.
    pub fn check_and_persist(&self) -> SystemHealthSummary {
        let summary = self.check_system();
        if let Err(err) = StateStore::save(&self.summary_path, &summary) {
            tracing::warn!(error = %err, "failed to persist system health summary");
        }
        info!(status = ?summary.system_status, agents = summary.agents.len(), "system health check complete");
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_health(path: &Path, status: &str, failures: u32) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            path,
            format!(
                "{{\"last_run\":\"{}\",\"status\":\"{status}\",\"consecutive_failures\":{failures}}}\n",
                Utc::now().to_rfc3339()
            ),
        )
        .unwrap();
    }

    #[test]
    fn system_status_is_the_worst_agent_class() {
        let dir = tempdir().unwrap();
        let healthy_path = dir.path().join("healthy.jsonl");
        let down_path = dir.path().join("down.jsonl");
        write_health(&healthy_path, "success", 0);
        write_health(&down_path, "error", 9);

        let mut paths = HashMap::new();
        paths.insert("agent-a".to_string(), healthy_path);
        paths.insert("agent-b".to_string(), down_path);

        let monitor = HealthMonitor::new(
            paths,
            dir.path().join("locks"),
            dir.path().join("inbox"),
            dir.path().join("system_health.json"),
        );
        let summary = monitor.check_system();
        assert_eq!(summary.system_status, HealthClass::Down);
        assert_eq!(summary.agents["agent-b"], HealthClass::Down);
    }

    #[test]
    fn down_agents_lists_only_down_classified_agents() {
        let dir = tempdir().unwrap();
        let down_path = dir.path().join("down.jsonl");
        write_health(&down_path, "error", 9);

        let mut paths = HashMap::new();
        paths.insert("agent-b".to_string(), down_path);

        let monitor = HealthMonitor::new(
            paths,
            dir.path().join("locks"),
            dir.path().join("inbox"),
            dir.path().join("system_health.json"),
        );
        assert_eq!(monitor.down_agents(), vec!["agent-b".to_string()]);
    }

    #[test]
    fn check_and_persist_writes_the_summary_file() {
        let dir = tempdir().unwrap();
        let monitor = HealthMonitor::new(
            HashMap::new(),
            dir.path().join("locks"),
            dir.path().join("inbox"),
            dir.path().join("system_health.json"),
        );
        monitor.check_and_persist();
        assert!(dir.path().join("system_health.json").exists());
    }

    #[test]
    fn queue_depth_excludes_processed_reports() {
        let dir = tempdir().unwrap();
        let inbox = dir.path().join("inbox").join("team-a").join("agent-a");
        std::fs::create_dir_all(&inbox).unwrap();
        std::fs::write(inbox.join("a_report.json"), "{}").unwrap();
        std::fs::write(inbox.join("b_report.processed.json"), "{}").unwrap();

        let monitor = HealthMonitor::new(
            HashMap::new(),
            dir.path().join("locks"),
            dir.path().join("inbox"),
            dir.path().join("system_health.json"),
        );
        assert_eq!(monitor.count_queue_depth(), 1);
    }
}
