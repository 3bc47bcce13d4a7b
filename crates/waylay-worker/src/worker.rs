//! The poll loop (spec §4.4): reserve → dispatch-with-timeout → destroy on
//! success, reschedule-or-fail on error; `clearLocks` at start and on
//! graceful shutdown.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use waylay_core::{Backend, HandlerContext, Job, ReserveQuery, Result};

use crate::config::WorkerConfig;

/// A handle the caller keeps to request graceful shutdown from elsewhere —
/// a signal handler, another task, a test. Dropping it has no effect;
/// `shutdown()` is the only way to stop the loop, matching spec §5's
/// "shutdown is cooperative", never abrupt.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Create a fresh shutdown channel. The receiver half is passed to
/// `Worker::run`; the sender half is this handle.
pub fn shutdown_channel() -> (ShutdownHandle, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, rx)
}

/// A single worker's poll loop. Construct one per logical worker process
/// (spec §5: "multi-process, each worker is a single logical thread of
/// execution").
pub struct Worker {
    backend: Arc<Backend>,
    ctx: HandlerContext,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(backend: Arc<Backend>, config: WorkerConfig) -> Self {
        let ctx = backend.handler_context();
        Self { backend, ctx, config }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Run until `shutdown` is signalled. `clearLocks` runs both on entry
    /// (recovering from an unclean prior exit) and on the way out.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.backend.clear_locks(&self.config.name).await?;
        info!(worker = %self.config.name, "worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                outcome = self.tick() => {
                    if let Err(e) = outcome {
                        warn!(worker = %self.config.name, error = %e, "reserve failed, will retry after sleep_delay");
                        self.sleep().await;
                    }
                }
            }
        }

        self.backend.clear_locks(&self.config.name).await?;
        info!(worker = %self.config.name, "worker stopped");
        Ok(())
    }

    /// One iteration: reserve, and if nothing was claimed, sleep for
    /// `sleep_delay` before the caller loops back around (spec §4.4's
    /// `sleep(sleep_delay); continue`).
    async fn tick(&self) -> Result<()> {
        let claimed = self.reserve_and_dispatch().await?;
        if !claimed {
            self.sleep().await;
        }
        Ok(())
    }

    async fn sleep(&self) {
        let delay = self.config.sleep_delay.to_std().unwrap_or(StdDuration::from_millis(0));
        tokio::time::sleep(delay).await;
    }

    /// Returns `Ok(true)` if a job was claimed (and therefore dispatched,
    /// regardless of its outcome), `Ok(false)` if `reserve` came back empty.
    async fn reserve_and_dispatch(&self) -> Result<bool> {
        let query = ReserveQuery {
            worker_name: self.config.name.clone(),
            min_priority: self.config.min_priority,
            max_priority: self.config.max_priority,
            queues: self.config.queues.clone(),
            max_run_time: self.config.max_run_time,
            read_ahead: self.config.read_ahead,
        };

        let Some(mut job) = self.backend.reserve(&query).await? else {
            return Ok(false);
        };

        debug!(job_id = job.row.id, job = %job.name(), worker = %self.config.name, "dispatching job");

        let max_run_time = self
            .config
            .max_run_time
            .to_std()
            .unwrap_or(StdDuration::from_secs(u64::MAX / 1_000_000_000));

        match tokio::time::timeout(max_run_time, job.invoke_job(&self.ctx)).await {
            Ok(Ok(())) => {
                if let Err(e) = job.destroy_it().await {
                    warn!(job_id = job.row.id, error = %e, "failed to delete completed job");
                }
            }
            Ok(Err(handler_err)) => {
                self.handle_failure(&mut job, &handler_err).await?;
            }
            Err(_elapsed) => {
                let timeout_err = anyhow::anyhow!(
                    "job exceeded max_run_time ({:?}); underlying action may still be running",
                    self.config.max_run_time
                );
                self.handle_failure(&mut job, &timeout_err).await?;
            }
        }

        Ok(true)
    }

    /// Spec §4.4 `handle_failure`. Every non-`nil` outcome — handler
    /// execution error, deserialization failure, handler-build rejection,
    /// or a `max_run_time` timeout — arrives here identically, per spec §7:
    /// deserialization and build errors "consume attempts until it fails
    /// permanently" exactly like an ordinary execution error, rather than
    /// skipping straight to `Failed`.
    async fn handle_failure(&self, job: &mut Job, error: &anyhow::Error) -> Result<()> {
        job.row.attempts += 1;
        let limit = retry_limit(job.max_attempts(), self.config.max_attempts);

        if job.row.attempts < limit {
            let next_run_at = job.reschedule_at(Utc::now());
            warn!(
                job_id = job.row.id,
                attempts = job.row.attempts,
                next_run_at = %next_run_at,
                error = %error,
                "job failed, rescheduling"
            );
            job.reschedule_it(next_run_at, Some(&error.to_string())).await
        } else {
            warn!(
                job_id = job.row.id,
                attempts = job.row.attempts,
                error = %error,
                "job exhausted retries, failing permanently"
            );
            job.fail_it().await
        }
    }
}

/// Spec §4.4 step 2: a job's own `max_attempts` handler key wins when
/// present and positive; `-1` (or absent) falls back to the worker's
/// configured default.
fn retry_limit(job_max_attempts: i32, worker_max_attempts: i32) -> i32 {
    if job_max_attempts > 0 {
        job_max_attempts
    } else {
        worker_max_attempts
    }
}
