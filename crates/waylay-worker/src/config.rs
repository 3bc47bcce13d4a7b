//! Worker configuration (spec §4.4: `{name, min_priority, max_priority,
//! queues, max_run_time, sleep_delay, read_ahead, max_attempts}`).

use chrono::Duration;

/// Defaults mirror the reservation protocol's source of inspiration (a
/// classic Rails `delayed_job` deployment): generous enough that a single
/// slow handler doesn't starve the lock, frequent enough that `sleep_delay`
/// doesn't dominate latency for a lightly loaded queue.
pub const DEFAULT_MAX_RUN_TIME_SECS: i64 = 4 * 60 * 60;
pub const DEFAULT_SLEEP_DELAY_MS: i64 = 5_000;
pub const DEFAULT_READ_AHEAD: i64 = 5;
pub const DEFAULT_MAX_ATTEMPTS: i32 = 25;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// `<hostname>:<pid>` by default, or an operator-supplied string (spec
    /// §6.3). Must be unique per live worker in the fleet.
    pub name: String,
    pub min_priority: Option<i32>,
    pub max_priority: Option<i32>,
    pub queues: Vec<String>,
    pub max_run_time: Duration,
    pub sleep_delay: Duration,
    pub read_ahead: i64,
    /// Fallback used when a job's own `max_attempts` handler key is absent
    /// or `-1` (spec §4.4 step 2).
    pub max_attempts: i32,
}

impl WorkerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_priority: None,
            max_priority: None,
            queues: Vec::new(),
            max_run_time: Duration::seconds(DEFAULT_MAX_RUN_TIME_SECS),
            sleep_delay: Duration::milliseconds(DEFAULT_SLEEP_DELAY_MS),
            read_ahead: DEFAULT_READ_AHEAD,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// `<hostname>:<pid>`, reading `HOSTNAME` and falling back to
    /// `"unknown-host"` rather than panicking when it's unset — the
    /// grounding source prefers an explicit fallback path here over a
    /// hard failure, since worker identity need only be unique, not
    /// meaningful.
    pub fn default_name() -> String {
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown-host".to_string());
        format!("{host}:{}", std::process::id())
    }

    pub fn with_queues(mut self, queues: Vec<String>) -> Self {
        self.queues = queues;
        self
    }

    pub fn with_priority_range(mut self, min: Option<i32>, max: Option<i32>) -> Self {
        self.min_priority = min;
        self.max_priority = max;
        self
    }

    pub fn with_max_run_time(mut self, max_run_time: Duration) -> Self {
        self.max_run_time = max_run_time;
        self
    }

    pub fn with_sleep_delay(mut self, sleep_delay: Duration) -> Self {
        self.sleep_delay = sleep_delay;
        self
    }

    pub fn with_read_ahead(mut self, read_ahead: i64) -> Self {
        self.read_ahead = read_ahead;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_applies_documented_defaults() {
        let config = WorkerConfig::new("w1");
        assert_eq!(config.max_run_time, Duration::seconds(DEFAULT_MAX_RUN_TIME_SECS));
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.read_ahead, DEFAULT_READ_AHEAD);
    }

    #[test]
    fn default_name_falls_back_without_panicking() {
        let name = WorkerConfig::default_name();
        assert!(name.contains(':'));
    }
}
