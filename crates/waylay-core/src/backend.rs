//! The shared database handle and the reservation protocol (spec §4.1).
//!
//! `Backend` owns a single `sqlx::AnyPool` so the same binary can run
//! against either Postgres or SQLite — the only thing that differs along
//! the hot path is the placeholder syntax, threaded through every
//! hand-built statement via `Dialect::placeholder`. Rows are read back
//! through the `sqlx::Row` trait field-by-field rather than a `FromRow`
//! derive, mirroring the grounding source's Postgres job store, since
//! `AnyRow` can't guarantee the column layout a derive would assume.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use tracing::{debug, instrument, warn};

use crate::ddl::{create_jobs_indexes_sql, create_jobs_table_sql};
use crate::dialect::Dialect;
use crate::error::{DeserializationError, Result, WaylayError};
use crate::handler::{HandlerContext, HandlerRegistry};
use crate::job::{parse_handler, stale_lock_boundary, Job, JobRow};
use crate::qb::{render_count, render_select, render_set, Column, Predicate};

/// A job not yet assigned an id, as accepted by `Backend::create` and by
/// `enqueue` internally (spec §4.1 `create(jobs…)`).
#[derive(Debug, Clone)]
pub struct NewJob {
    pub priority: i32,
    pub queue: Option<String>,
    pub handler: String,
    pub handler_id: String,
    pub run_at: Option<DateTime<Utc>>,
}

/// Parameters for a single `reserve` call (spec §4.4's worker config,
/// narrowed to what the reservation protocol itself consumes — the rest of
/// `WorkerConfig` lives in `waylay-worker`, which depends on this crate, so
/// this struct exists here to avoid requiring the reverse dependency).
#[derive(Debug, Clone)]
pub struct ReserveQuery {
    pub worker_name: String,
    pub min_priority: Option<i32>,
    pub max_priority: Option<i32>,
    pub queues: Vec<String>,
    pub max_run_time: Duration,
    pub read_ahead: i64,
}

/// Aggregate counts per derived state (spec §3.2), for the admin surface
/// described in §6.2. Ambient addition — see SPEC_FULL.md §4.1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub pending: i64,
    pub scheduled: i64,
    pub locked: i64,
    pub failed: i64,
}

type BoxFuture<'a> = std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>>;
type Checkpoint = Arc<dyn Fn(i64) -> BoxFuture<'static> + Send + Sync>;

/// Owns the connection pool and dialect, and implements every operation in
/// spec §4.1.
pub struct Backend {
    pool: AnyPool,
    dialect: Dialect,
    registry: HandlerRegistry,
    delay_jobs: AtomicBool,
    sequence_id: AtomicU64,
    reserve_checkpoint: RwLock<Option<Checkpoint>>,
}

impl Backend {
    /// Open a connection pool, inferring the dialect from `url`'s scheme
    /// (spec §4.1: "a boolean flag selected at open time").
    pub async fn connect(url: &str, registry: HandlerRegistry) -> Result<Arc<Self>> {
        let dialect = Dialect::from_url(url).ok_or_else(|| WaylayError::UnknownDialect(url.to_string()))?;
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new().connect(url).await?;
        Ok(Arc::new(Self {
            pool,
            dialect,
            registry,
            delay_jobs: AtomicBool::new(true),
            sequence_id: AtomicU64::new(0),
            reserve_checkpoint: RwLock::new(None),
        }))
    }

    /// A `Backend` suitable for unit tests that exercise `Job`/`Handler`
    /// plumbing without ever issuing a query. `connect_lazy` doesn't dial
    /// the database until the first query runs, so this never blocks and
    /// never needs a real SQLite/Postgres server.
    pub fn new_for_test() -> Self {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .connect_lazy("sqlite::memory:")
            .expect("connect_lazy does not dial eagerly and cannot fail here");
        Self {
            pool,
            dialect: Dialect::Sqlite,
            registry: HandlerRegistry::new(),
            delay_jobs: AtomicBool::new(true),
            sequence_id: AtomicU64::new(0),
            reserve_checkpoint: RwLock::new(None),
        }
    }

    /// A single-connection, schema-less in-memory SQLite backend for
    /// integration-style tests that do need real queries to succeed
    /// (`waylay-testing`'s harness calls `init_db` on the result before
    /// handing it to a test). A single connection is required — SQLite's
    /// `:memory:` database is otherwise per-connection, and a pool would
    /// silently fan each query out to a different, empty database.
    pub async fn connect_sqlite_memory(registry: HandlerRegistry) -> Result<Arc<Self>> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Arc::new(Self {
            pool,
            dialect: Dialect::Sqlite,
            registry,
            delay_jobs: AtomicBool::new(true),
            sequence_id: AtomicU64::new(0),
            reserve_checkpoint: RwLock::new(None),
        }))
    }

    /// Create the `jobs` table and its supporting indexes if they don't
    /// already exist (spec §3.1, §4.1.2 — the one contractual part of
    /// `waylay-cli init_db`).
    pub async fn init_db(&self) -> Result<()> {
        sqlx::query(&create_jobs_table_sql(self.dialect)).execute(&self.pool).await?;
        for stmt in create_jobs_indexes_sql(self.dialect) {
            sqlx::query(&stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Escape hatch for `waylay-testing`'s fixture helpers, which need to
    /// insert deliberately malformed or pre-locked rows that
    /// `Backend::enqueue`'s build-before-insert validation would reject.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn handler_context(self: &Arc<Self>) -> HandlerContext {
        HandlerContext::new(self.clone())
    }

    /// Whether `enqueue` persists rows at all. Flipping this off makes
    /// `enqueue` invoke the handler inline instead (spec §4.1), which is
    /// only useful in tests that want synchronous execution without a
    /// worker loop.
    pub fn set_delay_jobs(&self, delay: bool) {
        self.delay_jobs.store(delay, Ordering::SeqCst);
    }

    /// Install a hook that fires once per reservation candidate, after the
    /// candidate SELECT and before that candidate's conditional UPDATE
    /// (spec §8 scenario 2). Used by `waylay-testing` to force two
    /// concurrent `reserve` calls to interleave at the exact point the
    /// compare-and-swap races.
    pub fn set_reserve_checkpoint(&self, hook: Checkpoint) {
        *self.reserve_checkpoint.write().expect("checkpoint lock poisoned") = Some(hook);
    }

    pub fn clear_reserve_checkpoint(&self) {
        *self.reserve_checkpoint.write().expect("checkpoint lock poisoned") = None;
    }

    async fn fire_checkpoint(&self, job_id: i64) {
        let hook = self.reserve_checkpoint.read().expect("checkpoint lock poisoned").clone();
        if let Some(hook) = hook {
            hook(job_id).await;
        }
    }

    /// Generate a `handler_id` when the producer didn't supply `_uid`
    /// (spec §5 `sequence_id`). A lock-free atomic counter rather than the
    /// mutex-guarded one the grounding source uses — Rust gives us this for
    /// free. Resets well before overflow so the invariant "never panics on
    /// overflow" stays checkable rather than relying on silent wraparound.
    fn next_sequence_id(&self) -> u64 {
        let n = self.sequence_id.fetch_add(1, Ordering::Relaxed);
        if n >= u64::MAX - 1_000_000 {
            self.sequence_id.store(0, Ordering::Relaxed);
        }
        n
    }

    /// Spec §4.1 `enqueue`. Validates the handler builds before INSERT; if
    /// `delay_jobs` is false, skips persistence and runs the handler inline.
    #[instrument(skip(self, ctx, args), fields(queue = ?queue))]
    pub async fn enqueue(
        self: &Arc<Self>,
        ctx: &HandlerContext,
        priority: i32,
        queue: Option<String>,
        run_at: Option<DateTime<Utc>>,
        args: Value,
    ) -> Result<Option<i64>> {
        let object = args
            .as_object()
            .ok_or_else(|| WaylayError::Deserialization(DeserializationError::MalformedPayload(
                "enqueue args must be a JSON object".to_string(),
            )))?;
        let kind = object
            .get("type")
            .and_then(Value::as_str)
            .ok_or(WaylayError::Deserialization(DeserializationError::MissingType))?;

        // Build-before-insert: a transient build failure must surface to
        // the caller, not silently land a row that can never execute.
        let handler = self
            .registry
            .build(ctx, kind, &args)
            .map_err(WaylayError::Deserialization)?;

        if !self.delay_jobs.load(Ordering::SeqCst) {
            debug!(job_type = kind, "delay_jobs disabled, invoking handler inline");
            handler.perform().await.map_err(|e| WaylayError::HandlerBuild {
                job_id: 0,
                message: e.to_string(),
            })?;
            return Ok(None);
        }

        let handler_id = object
            .get("_uid")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("waylay-{}", self.next_sequence_id()));

        let handler_json = serde_json::to_string(&args)
            .map_err(|e| WaylayError::Deserialization(DeserializationError::MalformedPayload(e.to_string())))?;

        let ids = self
            .create(vec![NewJob {
                priority,
                queue,
                handler: handler_json,
                handler_id,
                run_at,
            }])
            .await?;
        Ok(ids.into_iter().next())
    }

    /// Spec §4.1 `create(jobs…)`: single transaction, rolls back on any
    /// failure. `run_at` defaults to `now` when absent.
    pub async fn create(&self, jobs: Vec<NewJob>) -> Result<Vec<i64>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(jobs.len());
        let now = Utc::now();

        for job in jobs {
            let run_at = job.run_at.unwrap_or(now);
            let sql = format!(
                "INSERT INTO jobs (priority, attempts, queue, handler, handler_id, run_at, created_at, updated_at) \
                 VALUES ({}, 0, {}, {}, {}, {}, {}, {})",
                self.dialect.placeholder(1),
                self.dialect.placeholder(2),
                self.dialect.placeholder(3),
                self.dialect.placeholder(4),
                self.dialect.placeholder(5),
                self.dialect.placeholder(6),
                self.dialect.placeholder(7),
            );
            let mut query = sqlx::query(&sql);
            query = bind_json(query, &json!(job.priority));
            query = bind_json(query, &job.queue.clone().map(Value::from).unwrap_or(Value::Null));
            query = bind_json(query, &Value::from(job.handler.clone()));
            query = bind_json(query, &Value::from(job.handler_id.clone()));
            query = bind_json(query, &Value::from(run_at.to_rfc3339()));
            query = bind_json(query, &Value::from(now.to_rfc3339()));
            query = bind_json(query, &Value::from(now.to_rfc3339()));
            let result = query.execute(&mut *tx).await?;
            ids.push(result.last_insert_id().unwrap_or_default());
        }

        tx.commit().await?;
        Ok(ids)
    }

    /// Spec §4.1 `update(id, attrs)`. `columns` are real column
    /// assignments; `updated_at` is always stamped regardless of what the
    /// caller passes.
    pub async fn update(&self, id: i64, mut columns: Vec<Column>) -> Result<()> {
        columns.push(Column::new("updated_at", Value::from(Utc::now().to_rfc3339())));
        let set = render_set(self.dialect, &columns, 1);
        let sql = format!(
            "UPDATE jobs SET {} WHERE id = {}",
            set.sql,
            self.dialect.placeholder(set.next_index)
        );
        let mut query = sqlx::query(&sql);
        for bind in &set.binds {
            query = bind_json(query, bind);
        }
        query = bind_json(query, &Value::from(id));
        query.execute(&self.pool).await?;
        Ok(())
    }

    /// Spec §4.1 `destroy(id)`: unconditional DELETE by PK.
    pub async fn destroy(&self, id: i64) -> Result<()> {
        let sql = format!("DELETE FROM jobs WHERE id = {}", self.dialect.placeholder(1));
        bind_json(sqlx::query(&sql), &Value::from(id)).execute(&self.pool).await?;
        Ok(())
    }

    /// Spec §4.1 `clearLocks(worker_name)`: releases every lock held by a
    /// departing worker. Called at `Worker` startup and shutdown.
    pub async fn clear_locks(&self, worker_name: &str) -> Result<()> {
        let sql = format!(
            "UPDATE jobs SET locked_at = NULL, locked_by = NULL, updated_at = {} WHERE locked_by = {}",
            self.dialect.placeholder(1),
            self.dialect.placeholder(2),
        );
        let mut query = sqlx::query(&sql);
        query = bind_json(query, &Value::from(Utc::now().to_rfc3339()));
        query = bind_json(query, &Value::from(worker_name));
        query.execute(&self.pool).await?;
        Ok(())
    }

    /// Spec §4.1 `count(predicate)`.
    pub async fn count(&self, predicate: &Predicate) -> Result<i64> {
        let rendered = render_count(self.dialect, predicate);
        let mut query = sqlx::query(&rendered.sql);
        for bind in &rendered.binds {
            query = bind_json(query, bind);
        }
        let row = query.fetch_one(&self.pool).await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    /// Spec §4.1 `where(predicate)` — named `where_rows` since `where` is a
    /// Rust keyword.
    pub async fn where_rows(&self, predicate: &Predicate) -> Result<Vec<JobRow>> {
        let rendered = render_select(self.dialect, predicate);
        let mut query = sqlx::query(&rendered.sql);
        for bind in &rendered.binds {
            query = bind_json(query, bind);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_job_row).collect()
    }

    /// Spec §4.1 `retry(id)` ≡ `update(id, {"@failed_at": nil})`.
    pub async fn retry(&self, id: i64) -> Result<()> {
        self.update(id, vec![Column::new("failed_at", Value::Null)]).await
    }

    /// Aggregate counts per derived state (ambient addition, SPEC_FULL.md
    /// §4.1). Written as four direct queries rather than through `Predicate`
    /// since the derived states need `OR`/inequality comparisons `Predicate`
    /// doesn't model (it only expresses equality conjunctions, which is all
    /// the admin `count`/`where` surface in spec §6.2 needs).
    pub async fn stats(&self) -> Result<Stats> {
        let now = Utc::now().to_rfc3339();
        let pending = self
            .scalar_count(
                "SELECT COUNT(*) FROM jobs WHERE failed_at IS NULL AND locked_by IS NULL AND run_at <= ?",
                &[Value::from(now.clone())],
            )
            .await?;
        let scheduled = self
            .scalar_count(
                "SELECT COUNT(*) FROM jobs WHERE failed_at IS NULL AND locked_by IS NULL AND run_at > ?",
                &[Value::from(now.clone())],
            )
            .await?;
        let locked = self
            .scalar_count(
                "SELECT COUNT(*) FROM jobs WHERE failed_at IS NULL AND locked_by IS NOT NULL",
                &[],
            )
            .await?;
        let failed = self
            .scalar_count("SELECT COUNT(*) FROM jobs WHERE failed_at IS NOT NULL", &[])
            .await?;

        Ok(Stats {
            pending,
            scheduled,
            locked,
            failed,
        })
    }

    async fn scalar_count(&self, template: &str, binds: &[Value]) -> Result<i64> {
        // `template` is written with bare `?` and rewritten here for the
        // active dialect, since these ad hoc queries don't go through `qb`.
        let mut idx = 1;
        let mut sql = String::with_capacity(template.len());
        for ch in template.chars() {
            if ch == '?' {
                sql.push_str(&self.dialect.placeholder(idx));
                idx += 1;
            } else {
                sql.push(ch);
            }
        }
        let mut query = sqlx::query(&sql);
        for bind in binds {
            query = bind_json(query, bind);
        }
        let row = query.fetch_one(&self.pool).await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    /// An explicit, one-shot lock-steal sweep independent of the worker
    /// poll loop (ambient addition, SPEC_FULL.md §4.1) — the worker still
    /// reclaims stale locks inline via `reserve`; this is for an operator
    /// job run on a schedule. Returns the number of rows reclaimed.
    pub async fn reclaim_stale(&self, max_run_time: Duration) -> Result<u64> {
        let boundary = stale_lock_boundary(Utc::now(), max_run_time);
        let sql = format!(
            "UPDATE jobs SET locked_at = NULL, locked_by = NULL, updated_at = {} \
             WHERE failed_at IS NULL AND locked_at IS NOT NULL AND locked_at < {}",
            self.dialect.placeholder(1),
            self.dialect.placeholder(2),
        );
        let mut query = sqlx::query(&sql);
        query = bind_json(query, &Value::from(Utc::now().to_rfc3339()));
        query = bind_json(query, &Value::from(boundary.to_rfc3339()));
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Spec §4.1.1, the reservation protocol: SELECT candidates in
    /// `priority ASC, run_at ASC` order, then for each issue a conditional
    /// UPDATE whose `WHERE` clause is the compare-and-swap. No
    /// `FOR UPDATE SKIP LOCKED`, no `RETURNING` — the two statements must
    /// work unmodified against either dialect.
    #[instrument(skip(self, query), fields(worker = %query.worker_name))]
    pub async fn reserve(self: &Arc<Self>, query: &ReserveQuery) -> Result<Option<Job>> {
        let now = Utc::now();
        let boundary = stale_lock_boundary(now, query.max_run_time);

        let mut idx = 1usize;
        let mut clauses = vec!["failed_at IS NULL".to_string()];
        let mut binds: Vec<Value> = Vec::new();

        clauses.push(format!("run_at <= {}", self.dialect.placeholder(idx)));
        binds.push(Value::from(now.to_rfc3339()));
        idx += 1;

        if let Some(min) = query.min_priority {
            clauses.push(format!("priority >= {}", self.dialect.placeholder(idx)));
            binds.push(Value::from(min));
            idx += 1;
        }
        if let Some(max) = query.max_priority {
            clauses.push(format!("priority <= {}", self.dialect.placeholder(idx)));
            binds.push(Value::from(max));
            idx += 1;
        }
        if !query.queues.is_empty() {
            let mut placeholders = Vec::with_capacity(query.queues.len());
            for q in &query.queues {
                placeholders.push(self.dialect.placeholder(idx));
                binds.push(Value::from(q.clone()));
                idx += 1;
            }
            clauses.push(format!("queue IN ({})", placeholders.join(", ")));
        }

        // Candidates must already satisfy the lock-eligibility half of the
        // reservation protocol (spec §4.1.1, invariant-2 of §3.3): a row
        // currently locked by another, non-stale worker isn't a candidate at
        // all, not a candidate that loses the race. Without this, a
        // contended table could burn a whole `read_ahead` window on rows
        // `try_claim` was always going to reject, starving the worker of an
        // eligible row further down the `ORDER BY` list.
        clauses.push(format!(
            "(locked_at IS NULL OR locked_at < {} OR locked_by = {})",
            self.dialect.placeholder(idx),
            self.dialect.placeholder(idx + 1),
        ));
        binds.push(Value::from(boundary.to_rfc3339()));
        binds.push(Value::from(query.worker_name.clone()));
        idx += 2;

        let select_sql = format!(
            "SELECT * FROM jobs WHERE {} ORDER BY priority ASC, run_at ASC LIMIT {}",
            clauses.join(" AND "),
            self.dialect.placeholder(idx),
        );
        binds.push(Value::from(query.read_ahead));

        let mut select = sqlx::query(&select_sql);
        for bind in &binds {
            select = bind_json(select, bind);
        }
        let candidates = select.fetch_all(&self.pool).await?;

        for row in &candidates {
            let candidate = row_to_job_row(row)?;
            self.fire_checkpoint(candidate.id).await;

            if self.try_claim(candidate.id, &query.worker_name, now, boundary).await? {
                let mut claimed = candidate;
                claimed.locked_at = Some(now);
                claimed.locked_by = Some(query.worker_name.clone());
                claimed.updated_at = now;
                debug!(job_id = claimed.id, worker = %query.worker_name, "claimed job");
                return Ok(Some(Job::new(claimed, self)));
            }
            debug!(job_id = candidate.id, worker = %query.worker_name, "lost race for candidate");
        }

        Ok(None)
    }

    /// The conditional UPDATE half of the reservation protocol (spec
    /// §4.1.1 step 2). Returns whether this call's `WHERE` clause matched —
    /// i.e. whether the compare-and-swap succeeded.
    async fn try_claim(&self, id: i64, worker: &str, now: DateTime<Utc>, boundary: DateTime<Utc>) -> Result<bool> {
        let sql = format!(
            "UPDATE jobs SET locked_at = {p1}, locked_by = {p2}, updated_at = {p3} \
             WHERE id = {p4} AND (locked_at IS NULL OR locked_at < {p5} OR locked_by = {p6}) AND failed_at IS NULL",
            p1 = self.dialect.placeholder(1),
            p2 = self.dialect.placeholder(2),
            p3 = self.dialect.placeholder(3),
            p4 = self.dialect.placeholder(4),
            p5 = self.dialect.placeholder(5),
            p6 = self.dialect.placeholder(6),
        );
        let mut update = sqlx::query(&sql);
        update = bind_json(update, &Value::from(now.to_rfc3339()));
        update = bind_json(update, &Value::from(worker));
        update = bind_json(update, &Value::from(now.to_rfc3339()));
        update = bind_json(update, &Value::from(id));
        update = bind_json(update, &Value::from(boundary.to_rfc3339()));
        update = bind_json(update, &Value::from(worker));
        let result = update.execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    /// Persist a reschedule (spec §4.2 `rescheduleIt`), called by
    /// `Job::reschedule_it` after it upgrades its `Weak<Backend>`.
    pub(crate) async fn persist_reschedule(&self, row: &JobRow) -> Result<()> {
        if let Some(last_error) = &row.last_error {
            warn!(job_id = row.id, attempts = row.attempts, error = %last_error, "job failed, rescheduling");
        }
        self.update(
            row.id,
            vec![
                Column::new("attempts", Value::from(row.attempts)),
                Column::new("locked_at", Value::Null),
                Column::new("locked_by", Value::Null),
                Column::new(
                    "run_at",
                    Value::from(row.run_at.map(|t| t.to_rfc3339()).unwrap_or_default()),
                ),
                Column::new(
                    "last_error",
                    row.last_error.clone().map(Value::from).unwrap_or(Value::Null),
                ),
            ],
        )
        .await
    }

    /// Persist a permanent failure (spec §4.2 `failIt`).
    pub(crate) async fn persist_fail(&self, id: i64, attempts: i32, failed_at: DateTime<Utc>) -> Result<()> {
        warn!(job_id = id, attempts, "job permanently failed");
        self.update(
            id,
            vec![
                Column::new("attempts", Value::from(attempts)),
                Column::new("failed_at", Value::from(failed_at.to_rfc3339())),
            ],
        )
        .await
    }
}

/// Validate and describe a stored `handler` blob without building it —
/// used by admin tooling that wants to display a job without constructing
/// its (possibly side-effecting) handler.
pub fn describe_handler(raw: &str) -> std::result::Result<Value, DeserializationError> {
    parse_handler(raw)
}

fn row_to_job_row(row: &AnyRow) -> Result<JobRow> {
    Ok(JobRow {
        id: row.try_get("id")?,
        priority: row.try_get("priority")?,
        attempts: row.try_get("attempts")?,
        queue: row.try_get("queue")?,
        handler: row.try_get("handler")?,
        handler_id: row.try_get("handler_id")?,
        last_error: row.try_get("last_error")?,
        run_at: row.try_get("run_at")?,
        locked_at: row.try_get("locked_at")?,
        failed_at: row.try_get("failed_at")?,
        locked_by: row.try_get("locked_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn bind_json<'q>(
    query: sqlx::query::Query<'q, sqlx::Any, AnyArguments<'q>>,
    value: &Value,
) -> sqlx::query::Query<'q, sqlx::Any, AnyArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                query.bind(n.to_string())
            }
        }
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}
