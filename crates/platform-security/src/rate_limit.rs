use chrono::{DateTime, Duration as ChronoDuration, Utc};
use platform_core::{PlatformError, PlatformResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::warn;

use crate::state_store::StateStore;

/// Persisted sliding-window counters for one named limiter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct WindowState {
    minute_window_start: DateTime<Utc>,
    minute_count: u32,
    day_window_start: DateTime<Utc>,
    day_count: u32,
}

impl WindowState {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            minute_window_start: now,
            minute_count: 0,
            day_window_start: midnight(now),
            day_count: 0,
        }
    }

    /// Resets whichever window(s) have elapsed. Mirrors the reference
    /// limiter's roll rule: a minute window older than 60s resets; a day
    /// window that predates today's UTC midnight resets.
    fn rolled(mut self, now: DateTime<Utc>) -> Self {
        if now - self.minute_window_start >= ChronoDuration::seconds(60) {
            self.minute_window_start = now;
            self.minute_count = 0;
        }
        let today_midnight = midnight(now);
        if self.day_window_start < today_midnight {
            self.day_window_start = today_midnight;
            self.day_count = 0;
        }
        self
    }
}

fn midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_else(|| now.naive_utc())
        .and_utc()
}

/// Remaining quota for the current minute and day windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Remaining {
    pub per_minute: u32,
    pub per_day: u32,
}

/// Sliding-window rate limiter with counters persisted to a JSON file, so
/// limits survive across process restarts. A missing or corrupt state file
/// is never an error — it is treated as a fresh set of windows.
pub struct RateLimiter {
    name: String,
    state_path: PathBuf,
    requests_per_minute: u32,
    requests_per_day: u32,
    backoff_base: f64,
    max_wait: Duration,
    jitter: bool,
    state: Mutex<()>,
}

impl RateLimiter {
    pub fn new(
        state_dir: impl Into<PathBuf>,
        name: impl Into<String>,
        requests_per_minute: u32,
        requests_per_day: u32,
        backoff_base: f64,
        max_wait: Duration,
    ) -> Self {
        let name = name.into();
        let safe = name.replace(['/', '\\'], "_");
        let state_path = state_dir.into().join(format!("rate_limit_{safe}.json"));
        Self {
            name,
            state_path,
            requests_per_minute,
            requests_per_day,
            backoff_base,
            max_wait,
            jitter: true,
            state: Mutex::new(()),
        }
    }

    /// Toggles backoff jitter (on by default). Disabling it makes retry
    /// delays deterministic, which is useful in tests that assert on
    /// timing.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Non-blocking attempt to consume one request slot.
    pub async fn try_acquire(&self) -> bool {
        let _guard = self.state.lock().await;
        let now = Utc::now();
        let state = StateStore::load(&self.state_path, WindowState::fresh(now)).rolled(now);

        if state.minute_count >= self.requests_per_minute || state.day_count >= self.requests_per_day
        {
            if let Err(err) = StateStore::save(&self.state_path, &state) {
                warn!(name = %self.name, error = %err, "failed to persist rate limiter state");
            }
            return false;
        }

        let next = WindowState {
            minute_count: state.minute_count + 1,
            day_count: state.day_count + 1,
            ..state
        };
        if let Err(err) = StateStore::save(&self.state_path, &next) {
            warn!(name = %self.name, error = %err, "failed to persist rate limiter state");
        }
        true
    }

    /// Blocks (via async sleeps) until a slot is available, using
    /// exponential backoff capped at `max_wait`.
    pub async fn acquire(&self) -> PlatformResult<()> {
        let deadline = tokio::time::Instant::now() + self.max_wait;
        let mut attempt: u32 = 0;
        loop {
            if self.try_acquire().await {
                return Ok(());
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                let remaining = self.remaining().await;
                return Err(PlatformError::RateLimit(format!(
                    "rate limit exceeded for '{}' after {:?} — remaining: {}/min, {}/day",
                    self.name, self.max_wait, remaining.per_minute, remaining.per_day
                )));
            }
            let mut delay = self.backoff_base * 2f64.powi(attempt.min(5) as i32);
            if self.jitter {
                delay *= 0.5 + rand::thread_rng().gen::<f64>();
            }
            let delay = Duration::from_secs_f64(delay).min(deadline - now);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }

    pub async fn remaining(&self) -> Remaining {
        let _guard = self.state.lock().await;
        let now = Utc::now();
        let state = StateStore::load(&self.state_path, WindowState::fresh(now)).rolled(now);
        Remaining {
            per_minute: self.requests_per_minute.saturating_sub(state.minute_count),
            per_day: self.requests_per_day.saturating_sub(state.day_count),
        }
    }

    pub async fn reset(&self) {
        let _guard = self.state.lock().await;
        let fresh = WindowState::fresh(Utc::now());
        if let Err(err) = StateStore::save(&self.state_path, &fresh) {
            warn!(name = %self.name, error = %err, "failed to persist rate limiter state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn allows_requests_under_the_minute_cap() {
        let dir = tempdir().unwrap();
        let limiter = RateLimiter::new(dir.path(), "sheets-api", 3, 1_000, 0.01, Duration::from_millis(50));
        assert!(limiter.try_acquire().await);
        assert!(limiter.try_acquire().await);
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test]
    async fn acquire_fails_fast_once_the_minute_budget_is_spent() {
        let dir = tempdir().unwrap();
        let limiter = RateLimiter::new(dir.path(), "sheets-api", 1, 1_000, 0.01, Duration::from_millis(30));
        assert!(limiter.try_acquire().await);
        let result = limiter.acquire().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn corrupt_state_file_is_treated_as_fresh() {
        let dir = tempdir().unwrap();
        let name = "sheets-api";
        std::fs::write(dir.path().join(format!("rate_limit_{name}.json")), b"not json").unwrap();
        let limiter = RateLimiter::new(dir.path(), name, 2, 1_000, 0.01, Duration::from_millis(30));
        assert!(limiter.try_acquire().await);
    }

    #[tokio::test]
    async fn reset_clears_counters() {
        let dir = tempdir().unwrap();
        let limiter = RateLimiter::new(dir.path(), "sheets-api", 1, 1_000, 0.01, Duration::from_millis(30));
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
        limiter.reset().await;
        assert!(limiter.try_acquire().await);
    }
}
