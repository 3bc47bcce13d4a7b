//! The concrete scenarios from spec §8, run against an in-memory SQLite
//! pool via `waylay-testing`'s harness.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use waylay_core::{Backend, Column, HandlerRegistry, Predicate, ReserveQuery};
use waylay_testing::{insert_fixture, install_race_checkpoint, sqlite_harness, Fixture};
use waylay_worker::{shutdown_channel, Worker, WorkerConfig};

async fn harness() -> Arc<Backend> {
    let mut registry = HandlerRegistry::new();
    waylay_handlers::register_all(&mut registry);
    sqlite_harness(registry).await.expect("harness bootstraps schema")
}

/// Scenario 1: enqueue and execute. Within a couple of poll ticks the row
/// is deleted.
#[tokio::test]
async fn enqueue_and_execute() {
    let backend = harness().await;
    insert_fixture(&backend, Fixture::noop().with_run_at(Utc::now() - Duration::seconds(1)))
        .await
        .unwrap();

    let config = WorkerConfig::new("w1").with_sleep_delay(Duration::milliseconds(20));
    let worker = Worker::new(backend.clone(), config);
    let (shutdown, rx) = shutdown_channel();
    let handle = tokio::spawn(async move { worker.run(rx).await });

    tokio::time::sleep(StdDuration::from_millis(100)).await;
    shutdown.shutdown();
    handle.await.unwrap().unwrap();

    let stats = backend.stats().await.unwrap();
    assert_eq!(stats.pending + stats.scheduled + stats.locked + stats.failed, 0);
}

/// Scenario 2 / property P1: two concurrent `reserve` calls racing for the
/// same candidate. At most one gets the job; the loser's candidate set is
/// exhausted, so it returns `Ok(None)`.
#[tokio::test]
async fn single_claim_under_concurrent_reserve() {
    let backend = harness().await;
    let id = insert_fixture(&backend, Fixture::noop().with_run_at(Utc::now() - Duration::seconds(1)))
        .await
        .unwrap();

    let barrier = install_race_checkpoint(&backend, 2);

    let query_for = |worker_name: &str| ReserveQuery {
        worker_name: worker_name.to_string(),
        min_priority: None,
        max_priority: None,
        queues: Vec::new(),
        max_run_time: Duration::seconds(60),
        read_ahead: 5,
    };

    let b1 = backend.clone();
    let q1 = query_for("a");
    let t1 = tokio::spawn(async move { b1.reserve(&q1).await });

    let b2 = backend.clone();
    let q2 = query_for("b");
    let t2 = tokio::spawn(async move { b2.reserve(&q2).await });

    let (r1, r2) = tokio::join!(t1, t2);
    let r1 = r1.unwrap().unwrap();
    let r2 = r2.unwrap().unwrap();

    let claims: Vec<_> = [r1, r2].into_iter().flatten().collect();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].row.id, id);

    let _ = barrier;
}

/// Scenario 3: retry-then-fail. First attempt reschedules; once `run_at`
/// has passed, the second attempt exhausts `max_attempts` and the row
/// becomes permanently failed.
#[tokio::test]
async fn retry_then_permanently_fail() {
    let backend = harness().await;
    let id = insert_fixture(
        &backend,
        Fixture::always_fail(2).with_run_at(Utc::now() - Duration::seconds(1)),
    )
    .await
    .unwrap();

    let config = WorkerConfig::new("w1").with_sleep_delay(Duration::milliseconds(20));
    let worker = Worker::new(backend.clone(), config);
    let (shutdown, rx) = shutdown_channel();
    let handle = tokio::spawn(async move { worker.run(rx).await });

    tokio::time::sleep(StdDuration::from_millis(80)).await;

    let predicate = Predicate::new().eq("id", serde_json::Value::from(id));
    let rows = backend.where_rows(&predicate).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].attempts, 1);
    assert!(rows[0].failed_at.is_none());
    assert!(rows[0].last_error.is_some());

    // "Advance clock past run_at": pull the row's schedule into the past
    // directly rather than sleeping out the real ~15s backoff.
    backend
        .update(
            id,
            vec![Column::new(
                "run_at",
                serde_json::Value::from((Utc::now() - Duration::seconds(1)).to_rfc3339()),
            )],
        )
        .await
        .unwrap();

    tokio::time::sleep(StdDuration::from_millis(80)).await;
    shutdown.shutdown();
    handle.await.unwrap().unwrap();

    let rows = backend.where_rows(&predicate).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].attempts, 2);
    assert!(rows[0].failed_at.is_some());
}

/// Scenario 4: lock steal. A lock older than `max_run_time` is claimable by
/// a different worker.
#[tokio::test]
async fn lock_steal_after_max_run_time() {
    let backend = harness().await;
    let past_lock = Utc::now() - Duration::seconds(5);
    insert_fixture(
        &backend,
        Fixture::noop()
            .with_run_at(Utc::now() - Duration::seconds(10))
            .locked_by("worker-a", past_lock),
    )
    .await
    .unwrap();

    let query = ReserveQuery {
        worker_name: "worker-b".to_string(),
        min_priority: None,
        max_priority: None,
        queues: Vec::new(),
        max_run_time: Duration::seconds(1),
        read_ahead: 5,
    };

    let claimed = backend.reserve(&query).await.unwrap();
    assert!(claimed.is_some(), "worker-b should steal the stale lock");
}

/// Scenario 6: priority ordering. Three runnable jobs with priorities 5, 1,
/// 3 execute in ascending-priority order under a single worker.
#[tokio::test]
async fn priority_ordering() {
    let backend = harness().await;
    let now = Utc::now() - Duration::seconds(1);
    for priority in [5, 1, 3] {
        insert_fixture(&backend, Fixture::noop().with_priority(priority).with_run_at(now))
            .await
            .unwrap();
    }

    let query = ReserveQuery {
        worker_name: "w1".to_string(),
        min_priority: None,
        max_priority: None,
        queues: Vec::new(),
        max_run_time: Duration::seconds(60),
        read_ahead: 5,
    };

    let mut observed = Vec::new();
    for _ in 0..3 {
        let job = backend.reserve(&query).await.unwrap().expect("a job remains");
        observed.push(job.row.priority);
        job.destroy_it().await.unwrap();
    }

    assert_eq!(observed, vec![1, 3, 5]);
}

/// Scenario 5: multiplexed fan-out. Executing the outer job materializes
/// its rules as new rows in one transaction and deletes the outer row.
#[tokio::test]
async fn multiplexed_fan_out() {
    let backend = harness().await;
    let handler = serde_json::json!({
        "type": "multiplexed",
        "arguments": {"type": "noop"},
        "rules": [
            {"priority": 1, "queue": "a"},
            {"priority": 2, "queue": "b"},
            {"priority": 3, "queue": "c"},
        ]
    });
    let outer_id = insert_fixture(&backend, Fixture::new(handler).with_run_at(Utc::now() - Duration::seconds(1)))
        .await
        .unwrap();

    let query = ReserveQuery {
        worker_name: "w1".to_string(),
        min_priority: None,
        max_priority: None,
        queues: Vec::new(),
        max_run_time: Duration::seconds(60),
        read_ahead: 5,
    };
    let job = backend.reserve(&query).await.unwrap().expect("outer job is claimable");
    let ctx = backend.handler_context();
    job.invoke_job(&ctx).await.expect("multiplexed handler fans out");
    job.destroy_it().await.unwrap();

    let all = backend.where_rows(&Predicate::new()).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.iter().all(|row| row.id != outer_id));

    let mut priorities: Vec<_> = all.iter().map(|row| row.priority).collect();
    priorities.sort();
    assert_eq!(priorities, vec![1, 2, 3]);
}
