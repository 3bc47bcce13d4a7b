//! In-memory job representation (spec §4.2).

use std::sync::{Arc, OnceLock, Weak};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::backend::Backend;
use crate::error::{DeserializationError, Result, WaylayError};
use crate::handler::{Handler, HandlerContext};

/// Minimum `try_interval` a handler descriptor may specify before it's
/// ignored in favor of the default backoff (spec §4.2 `reschedule_at`).
pub const MIN_TRY_INTERVAL: Duration = Duration::seconds(5);

/// The bare row, independent of any backend connection. `sqlx::FromRow` is
/// deliberately not derived here — rows are read field-by-field through the
/// `Row` trait against an `AnyRow`, since the dialect-agnostic pool can't
/// guarantee a single concrete row type to derive against (see `backend.rs`
/// `row_to_job`).
#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    pub id: i64,
    pub priority: i32,
    pub attempts: i32,
    pub queue: Option<String>,
    pub handler: String,
    pub handler_id: String,
    pub last_error: Option<String>,
    pub run_at: Option<DateTime<Utc>>,
    pub locked_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRow {
    /// Spec §3.2 "Failed" — named for what it returns, unlike the
    /// `isFailed` inversion spec §9 calls out in the reference
    /// implementation.
    pub fn is_failed(&self) -> bool {
        self.failed_at.is_some()
    }

    /// Spec §3.2 "Pending".
    pub fn is_pending(&self, now: DateTime<Utc>) -> bool {
        !self.is_failed() && self.locked_by.is_none() && self.run_at.map_or(true, |t| t <= now)
    }

    /// Spec §3.2 "Scheduled".
    pub fn is_scheduled(&self, now: DateTime<Utc>) -> bool {
        !self.is_failed() && self.locked_by.is_none() && self.run_at.is_some_and(|t| t > now)
    }

    /// Spec §3.2 "Locked/Active".
    pub fn is_locked(&self) -> bool {
        !self.is_failed() && self.locked_by.is_some()
    }

    /// Spec §3.2 "Stale-locked": `locked_at` older than the last
    /// `max_run_time`-aligned boundary, per the flooring rule in spec
    /// §4.1.1. See `stale_lock_boundary` for the actual arithmetic.
    pub fn is_stale(&self, now: DateTime<Utc>, max_run_time: Duration) -> bool {
        match self.locked_at {
            Some(locked_at) => locked_at < stale_lock_boundary(now, max_run_time),
            None => false,
        }
    }
}

/// The staleness boundary used by the reservation protocol: `now` truncated
/// down to a multiple of `max_run_time` (spec §4.1.1's flooring rule,
/// preserved verbatim rather than reinterpreted as a subtraction — the
/// invariant "a lock older than one `max_run_time` unit is stealable" holds
/// either way, but the flooring makes the boundary shared by every
/// `reserve` call in the same `max_run_time` window, which is what the
/// reference implementation actually does).
pub fn stale_lock_boundary(now: DateTime<Utc>, max_run_time: Duration) -> DateTime<Utc> {
    let max_run_secs = max_run_time.num_seconds().max(1);
    let now_secs = now.timestamp();
    let floored = (now_secs / max_run_secs) * max_run_secs;
    DateTime::from_timestamp(floored, 0).unwrap_or(now)
}

/// In-memory record of a row plus its cached, lazily-built handler.
///
/// Holds a `Weak<Backend>` rather than an `Arc` — per spec §9's design
/// note, this is a "relation, not ownership" edge. A `Job` must never keep
/// its backend alive; if the backend has already been dropped by the time
/// a mutating method runs, that's a real (if unusual) error in Rust, and is
/// reported as `WaylayError::BackendGone` rather than papered over.
pub struct Job {
    pub row: JobRow,
    backend: Weak<Backend>,
    cached_handler: OnceLock<Arc<dyn Handler>>,
}

impl Job {
    pub fn new(row: JobRow, backend: &Arc<Backend>) -> Self {
        Self {
            row,
            backend: Arc::downgrade(backend),
            cached_handler: OnceLock::new(),
        }
    }

    fn upgrade(&self) -> Result<Arc<Backend>> {
        self.backend.upgrade().ok_or(WaylayError::BackendGone(self.row.id))
    }

    /// Display name for logs (spec §4.2 `name()`): the handler's
    /// `display_name` key if present, else the `type` key, else a
    /// placeholder.
    pub fn name(&self) -> String {
        parse_handler(&self.row.handler)
            .ok()
            .and_then(|v| {
                v.get("display_name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| v.get("type").and_then(Value::as_str).map(str::to_string))
            })
            .unwrap_or_else(|| format!("job#{}", self.row.id))
    }

    /// Spec §4.2 `max_attempts()`: `-1` means "use the worker's default".
    pub fn max_attempts(&self) -> i32 {
        parse_handler(&self.row.handler)
            .ok()
            .and_then(|v| v.get("max_attempts").and_then(Value::as_i64))
            .map(|n| n as i32)
            .unwrap_or(-1)
    }

    /// Spec §4.2 `reschedule_at()`.
    ///
    /// Resolved per spec §9's ambiguity note: `now + attempts * 10s + 5s`,
    /// a real five-second `Duration` — not the `5ns + 1s` artifact the
    /// reference implementation produces by adding a bare integer literal
    /// to a `Duration`. `try_interval` overrides this when it parses to at
    /// least `MIN_TRY_INTERVAL`.
    pub fn reschedule_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        if let Some(interval) = self.try_interval() {
            if interval >= MIN_TRY_INTERVAL {
                return now + interval;
            }
        }
        now + Duration::seconds(i64::from(self.row.attempts) * 10) + Duration::seconds(5)
    }

    fn try_interval(&self) -> Option<Duration> {
        let value = parse_handler(&self.row.handler).ok()?;
        let raw = value.get("try_interval")?.as_str()?;
        parse_duration_string(raw)
    }

    /// Spec §4.2 `payload_object()`: lazily parse `handler` and build the
    /// concrete `Handler` via the registry. Cached for the lifetime of this
    /// `Job` value.
    pub fn payload_object(&self, ctx: &HandlerContext) -> std::result::Result<Arc<dyn Handler>, DeserializationError> {
        if let Some(cached) = self.cached_handler.get() {
            return Ok(cached.clone());
        }

        let value = parse_handler(&self.row.handler)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(DeserializationError::MissingType)?;

        let handler: Arc<dyn Handler> = ctx.backend().registry().build(ctx, kind, &value)?.into();
        // Another caller may have raced us to populate the cache; either
        // value is equally valid, so ignore the `Err` from `set`.
        let _ = self.cached_handler.set(handler.clone());
        Ok(handler)
    }

    /// Spec §4.2 `invokeJob()`.
    pub async fn invoke_job(&self, ctx: &HandlerContext) -> anyhow::Result<()> {
        let handler = self.payload_object(ctx)?;
        handler.perform().await
    }

    /// Spec §4.2 `rescheduleIt(next_time)`: clears the lock and sets
    /// `run_at`. Does *not* bump `attempts` itself — the worker's
    /// `handle_failure` step does that before choosing between this and
    /// `fail_it`, per spec §4.4 step 1, since the same incremented count
    /// must land whichever path is taken.
    pub async fn reschedule_it(&mut self, next_time: DateTime<Utc>, error: Option<&str>) -> Result<()> {
        let backend = self.upgrade()?;
        self.row.locked_at = None;
        self.row.locked_by = None;
        self.row.run_at = Some(next_time);
        self.row.last_error = error.map(|e| truncate_error(e));
        backend.persist_reschedule(&self.row).await
    }

    /// Spec §4.2 `failIt()`: stamps `failed_at = now`, row retained. Persists
    /// whatever `attempts` the worker has already set on `self.row`.
    pub async fn fail_it(&mut self) -> Result<()> {
        let backend = self.upgrade()?;
        let now = Utc::now();
        self.row.failed_at = Some(now);
        backend.persist_fail(self.row.id, self.row.attempts, now).await
    }

    /// Spec §4.2 `destroyIt()`.
    pub async fn destroy_it(&self) -> Result<()> {
        let backend = self.upgrade()?;
        backend.destroy(self.row.id).await
    }
}

/// Parse the stored `handler` JSON text into a `Value`, validating it is an
/// object (spec §6.1: "a JSON object").
pub fn parse_handler(raw: &str) -> std::result::Result<Value, DeserializationError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| DeserializationError::MalformedPayload(e.to_string()))?;
    if !value.is_object() {
        return Err(DeserializationError::MalformedPayload(
            "handler payload is not a JSON object".to_string(),
        ));
    }
    Ok(value)
}

/// Parse a duration string like `"30s"`, `"5m"`, `"1h"` (spec §6.1
/// `try_interval`). Unrecognized formats are treated as absent rather than
/// erroring — a malformed `try_interval` shouldn't fail the whole job.
fn parse_duration_string(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (number, unit) = raw.split_at(raw.len().checked_sub(1)?);
    let n: i64 = number.parse().ok()?;
    match unit {
        "s" => Some(Duration::seconds(n)),
        "m" => Some(Duration::minutes(n)),
        "h" => Some(Duration::hours(n)),
        _ => None,
    }
}

/// Truncate an error message to 200 characters before persisting, per spec
/// §3.1 `last_error` and §4.4 failure handling step 3.
pub fn truncate_error(message: &str) -> String {
    const MAX: usize = 200;
    if message.chars().count() <= MAX {
        message.to_string()
    } else {
        message.chars().take(MAX).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(attempts: i32, handler: &str) -> JobRow {
        let now = Utc::now();
        JobRow {
            id: 1,
            priority: 0,
            attempts,
            queue: None,
            handler: handler.to_string(),
            handler_id: "h1".to_string(),
            last_error: None,
            run_at: Some(now),
            locked_at: None,
            failed_at: None,
            locked_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn is_failed_is_not_inverted() {
        let mut r = row(0, "{\"type\":\"noop\"}");
        assert!(!r.is_failed());
        r.failed_at = Some(Utc::now());
        assert!(r.is_failed());
    }

    #[test]
    fn reschedule_at_uses_linear_backoff_by_default() {
        let j = Job::new(row(2, "{\"type\":\"noop\"}"), &Arc::new(Backend::new_for_test()));
        let now = Utc::now();
        let scheduled = j.reschedule_at(now);
        // attempts(2) * 10s + 5s = 25s
        assert_eq!(scheduled, now + Duration::seconds(25));
    }

    #[test]
    fn reschedule_at_honors_try_interval_when_large_enough() {
        let j = Job::new(
            row(0, "{\"type\":\"noop\",\"try_interval\":\"30s\"}"),
            &Arc::new(Backend::new_for_test()),
        );
        let now = Utc::now();
        assert_eq!(j.reschedule_at(now), now + Duration::seconds(30));
    }

    #[test]
    fn reschedule_at_ignores_try_interval_below_minimum() {
        let j = Job::new(
            row(0, "{\"type\":\"noop\",\"try_interval\":\"2s\"}"),
            &Arc::new(Backend::new_for_test()),
        );
        let now = Utc::now();
        assert_eq!(j.reschedule_at(now), now + Duration::seconds(5));
    }

    #[test]
    fn max_attempts_defaults_to_unbounded_sentinel() {
        let j = Job::new(row(0, "{\"type\":\"noop\"}"), &Arc::new(Backend::new_for_test()));
        assert_eq!(j.max_attempts(), -1);
    }

    #[test]
    fn max_attempts_reads_handler_field() {
        let j = Job::new(
            row(0, "{\"type\":\"noop\",\"max_attempts\":7}"),
            &Arc::new(Backend::new_for_test()),
        );
        assert_eq!(j.max_attempts(), 7);
    }

    #[test]
    fn name_prefers_display_name_then_type_then_placeholder() {
        let j1 = Job::new(
            row(0, "{\"type\":\"noop\",\"display_name\":\"Send welcome email\"}"),
            &Arc::new(Backend::new_for_test()),
        );
        assert_eq!(j1.name(), "Send welcome email");

        let j2 = Job::new(row(0, "{\"type\":\"noop\"}"), &Arc::new(Backend::new_for_test()));
        assert_eq!(j2.name(), "noop");

        let j3 = Job::new(row(0, "not json"), &Arc::new(Backend::new_for_test()));
        assert_eq!(j3.name(), "job#1");
    }

    #[test]
    fn truncate_error_caps_at_200_chars() {
        let long = "x".repeat(500);
        assert_eq!(truncate_error(&long).chars().count(), 200);
        assert_eq!(truncate_error("short"), "short");
    }

    #[test]
    fn stale_lock_boundary_floors_to_max_run_time_multiple() {
        let now = DateTime::from_timestamp(1_000_000, 0).unwrap();
        let boundary = stale_lock_boundary(now, Duration::seconds(60));
        assert_eq!(boundary.timestamp(), 1_000_000 / 60 * 60);
    }
}
