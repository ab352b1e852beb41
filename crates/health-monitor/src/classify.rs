use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An agent's classification, ordered worst-to-best for system-level
/// aggregation: `down > degraded > healthy > unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthClass {
    Unknown,
    Healthy,
    Degraded,
    Down,
}

/// The latest parsed values from one agent's health file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub last_run: DateTime<Utc>,
    pub status: String,
    pub consecutive_failures: u32,
}

/// Silence and failure-count thresholds driving [`classify`]. Defaults
/// are 6/3 consecutive failures, 30/10 minutes of silence.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub down_failure_threshold: u32,
    pub degraded_failure_threshold: u32,
    pub down_silence_minutes: i64,
    pub degraded_silence_minutes: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            down_failure_threshold: 6,
            degraded_failure_threshold: 3,
            down_silence_minutes: 30,
            degraded_silence_minutes: 10,
        }
    }
}

/// Classifies an agent from its latest health snapshot. A missing
/// snapshot (no parseable timestamp) is `Unknown`; failure count takes
/// priority over silence, and both take priority over a clean bill of
/// health.
pub fn classify(snapshot: Option<&HealthSnapshot>, now: DateTime<Utc>, thresholds: Thresholds) -> HealthClass {
    let Some(snapshot) = snapshot else {
        return HealthClass::Unknown;
    };

    if snapshot.consecutive_failures >= thresholds.down_failure_threshold {
        return HealthClass::Down;
    }
    if snapshot.consecutive_failures >= thresholds.degraded_failure_threshold {
        return HealthClass::Degraded;
    }

    let silence_minutes = (now - snapshot.last_run).num_minutes();
    if silence_minutes >= thresholds.down_silence_minutes {
        return HealthClass::Down;
    }
    if silence_minutes >= thresholds.degraded_silence_minutes {
        return HealthClass::Degraded;
    }

    HealthClass::Healthy
}

/// Worst classification across a set of agents; `down` beats `degraded`
/// beats `healthy` beats `unknown`.
pub fn worst(classes: impl IntoIterator<Item = HealthClass>) -> HealthClass {
    classes.into_iter().max().unwrap_or(HealthClass::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn snap(failures: u32, minutes_ago: i64, now: DateTime<Utc>) -> HealthSnapshot {
        HealthSnapshot {
            last_run: now - Duration::minutes(minutes_ago),
            status: "success".to_string(),
            consecutive_failures: failures,
        }
    }

    #[test]
    fn healthy_when_recent_and_no_failures() {
        let now = Utc::now();
        let class = classify(Some(&snap(0, 1, now)), now, Thresholds::default());
        assert_eq!(class, HealthClass::Healthy);
    }

    #[test]
    fn down_on_failure_threshold() {
        let now = Utc::now();
        let class = classify(Some(&snap(6, 1, now)), now, Thresholds::default());
        assert_eq!(class, HealthClass::Down);
    }

    #[test]
    fn degraded_on_failure_threshold() {
        let now = Utc::now();
        let class = classify(Some(&snap(3, 1, now)), now, Thresholds::default());
        assert_eq!(class, HealthClass::Degraded);
    }

    #[test]
    fn down_on_silence() {
        let now = Utc::now();
        let class = classify(Some(&snap(0, 31, now)), now, Thresholds::default());
        assert_eq!(class, HealthClass::Down);
    }

    #[test]
    fn degraded_on_silence() {
        let now = Utc::now();
        let class = classify(Some(&snap(0, 11, now)), now, Thresholds::default());
        assert_eq!(class, HealthClass::Degraded);
    }

    #[test]
    fn missing_snapshot_is_unknown() {
        let now = Utc::now();
        assert_eq!(classify(None, now, Thresholds::default()), HealthClass::Unknown);
    }

    #[test]
    fn worst_picks_down_over_everything() {
        let classes = [HealthClass::Healthy, HealthClass::Degraded, HealthClass::Down, HealthClass::Unknown];
        assert_eq!(worst(classes), HealthClass::Down);
    }

    #[test]
    fn worst_of_empty_is_unknown() {
        assert_eq!(worst(std::iter::empty()), HealthClass::Unknown);
    }
}
