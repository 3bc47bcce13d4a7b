//! Integration test harness for `waylay-core` (SPEC_FULL.md §8): schema
//! bootstrap over an in-memory SQLite pool, raw fixture insertion, and the
//! reservation-race checkpoint helper used by scenario 2 / property P1.
//!
//! A Postgres-backed variant of this harness would follow the same shape
//! against a `DATABASE_URL` the caller supplies — this crate only ships the
//! SQLite path, since every property in spec §8 is dialect-independent and
//! SQLite needs no external server to exercise them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::Row;
use waylay_core::{Backend, HandlerRegistry};

/// Build a ready-to-use `Backend` backed by a fresh in-memory SQLite
/// database, schema already created.
pub async fn sqlite_harness(registry: HandlerRegistry) -> anyhow::Result<Arc<Backend>> {
    let backend = Backend::connect_sqlite_memory(registry).await?;
    backend.init_db().await?;
    Ok(backend)
}

/// A job row to insert directly, bypassing `Backend::enqueue`'s
/// build-before-insert validation — tests that need a deliberately
/// malformed or pre-locked row use this instead.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub priority: i32,
    pub attempts: i32,
    pub queue: Option<String>,
    pub handler: Value,
    pub run_at: Option<DateTime<Utc>>,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl Fixture {
    pub fn new(handler: Value) -> Self {
        Self {
            priority: 0,
            attempts: 0,
            queue: None,
            handler,
            run_at: None,
            locked_at: None,
            locked_by: None,
            failed_at: None,
        }
    }

    pub fn noop() -> Self {
        Self::new(serde_json::json!({"type": "noop"}))
    }

    pub fn always_fail(max_attempts: i32) -> Self {
        Self::new(serde_json::json!({"type": "always_fail", "max_attempts": max_attempts}))
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn with_run_at(mut self, run_at: DateTime<Utc>) -> Self {
        self.run_at = Some(run_at);
        self
    }

    pub fn locked_by(mut self, worker: impl Into<String>, locked_at: DateTime<Utc>) -> Self {
        self.locked_by = Some(worker.into());
        self.locked_at = Some(locked_at);
        self
    }
}

/// Insert `fixture` directly via raw SQL (not through `Backend::enqueue`,
/// which would reject an already-locked or already-failed row) and return
/// its assigned id.
pub async fn insert_fixture(backend: &Backend, fixture: Fixture) -> anyhow::Result<i64> {
    let now = Utc::now();
    let run_at = fixture.run_at.unwrap_or(now);
    let handler_text = serde_json::to_string(&fixture.handler)?;

    let row = sqlx::query(
        "INSERT INTO jobs \
         (priority, attempts, queue, handler, handler_id, run_at, locked_at, locked_by, failed_at, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(fixture.priority)
    .bind(fixture.attempts)
    .bind(fixture.queue)
    .bind(handler_text)
    .bind(format!("fixture-{now}"))
    .bind(run_at.to_rfc3339())
    .bind(fixture.locked_at.map(|t| t.to_rfc3339()))
    .bind(fixture.locked_by)
    .bind(fixture.failed_at.map(|t| t.to_rfc3339()))
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .fetch_one(backend.pool())
    .await?;

    Ok(row.try_get::<i64, _>("id")?)
}

/// Pairs a `Backend`'s reservation checkpoint with a `tokio::sync::Barrier`
/// so a test can force N concurrent `reserve` calls to interleave at the
/// exact point between the candidate SELECT and its conditional UPDATE
/// (spec §8 scenario 2, property P1). Each call to `reserve` that reaches a
/// candidate awaits the barrier before proceeding to the UPDATE; once
/// `parties` callers have all arrived, every one of them resumes at once.
/// The hook itself is async and is awaited directly from `reserve` — it
/// must never bridge back into `Handle::block_on`, since it runs on the
/// same runtime that's already polling the `reserve` future.
pub fn install_race_checkpoint(backend: &Backend, parties: usize) -> Arc<tokio::sync::Barrier> {
    let barrier = Arc::new(tokio::sync::Barrier::new(parties));
    let hook_barrier = barrier.clone();
    backend.set_reserve_checkpoint(Arc::new(move |_job_id| {
        let hook_barrier = hook_barrier.clone();
        Box::pin(async move {
            hook_barrier.wait().await;
        })
    }));
    barrier
}

#[cfg(test)]
mod tests {
    use super::*;
    use waylay_handlers::register_all;

    async fn harness() -> Arc<Backend> {
        let mut registry = HandlerRegistry::new();
        register_all(&mut registry);
        sqlite_harness(registry).await.expect("harness sets up schema")
    }

    #[tokio::test]
    async fn harness_creates_an_empty_jobs_table() {
        let backend = harness().await;
        let stats = backend.stats().await.expect("stats query succeeds against bootstrapped schema");
        assert_eq!(stats, waylay_core::Stats::default());
    }

    #[tokio::test]
    async fn insert_fixture_round_trips_through_where_rows() {
        let backend = harness().await;
        let id = insert_fixture(&backend, Fixture::noop().with_priority(3))
            .await
            .expect("fixture inserts");

        let predicate = waylay_core::Predicate::new().eq("id", serde_json::Value::from(id));
        let rows = backend.where_rows(&predicate).await.expect("where_rows succeeds");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].priority, 3);
    }
}
