//! # Job Queue Tests
//!
//! Consumer behaviour of [`PriorityQueue`]: priority order, failure isolation,
//! periodic schedules and shutdown.

use futures::FutureExt;
use keycloak_realm_operator::controller::queue::{JobHandler, JobQueue, PriorityQueue};
use keycloak_realm_operator::error::ReconcileError;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Handler recording every payload; payloads starting with `fail` return an error.
fn recorder() -> (JobHandler<String>, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let handler: JobHandler<String> = Arc::new(move |payload: String| {
        let log = Arc::clone(&log);
        async move {
            let failed = payload.starts_with("fail");
            log.lock().unwrap().push(payload);
            if failed {
                return Err(ReconcileError::ParentScopeMissing("acme".to_string()));
            }
            Ok(())
        }
        .boxed()
    });
    (handler, seen)
}

async fn wait_for(seen: &Mutex<Vec<String>>, count: usize) -> Vec<String> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if seen.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("jobs did not run in time");
    seen.lock().unwrap().clone()
}

#[tokio::test]
async fn test_triggered_job_runs_before_periodic_job() {
    let queue: PriorityQueue<String> = PriorityQueue::new("keycloakgroups-reconciliation");
    queue.enqueue("keycloakgroups-full-resync", "resync".to_string(), 100);
    queue.enqueue("keycloakgroups-reconcile", "admins".to_string(), 10);
    let (handler, seen) = recorder();

    queue.start(handler);

    assert_eq!(wait_for(&seen, 2).await, vec!["admins", "resync"]);
    queue.close();
}

#[tokio::test]
async fn test_failed_job_does_not_stop_the_consumer() {
    let queue: PriorityQueue<String> = PriorityQueue::new("failures");
    let (handler, seen) = recorder();
    queue.start(handler);

    queue.enqueue("first", "fail-first".to_string(), 10);
    queue.enqueue("second", "second".to_string(), 10);

    assert_eq!(wait_for(&seen, 2).await, vec!["fail-first", "second"]);
    queue.close();
}

#[tokio::test(start_paused = true)]
async fn test_periodic_schedule_fires_every_interval() {
    let queue: PriorityQueue<String> = PriorityQueue::new("schedules");
    let (handler, seen) = recorder();
    queue.start(handler);
    queue.upsert_periodic("resync", Duration::from_secs(60), "tick".to_string(), 100);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(seen.lock().unwrap().is_empty());

    tokio::time::sleep(Duration::from_secs(100)).await;
    assert_eq!(seen.lock().unwrap().as_slice(), ["tick", "tick"]);
    queue.close();
}

#[tokio::test]
async fn test_promote_runs_schedule_without_waiting() {
    let queue: PriorityQueue<String> = PriorityQueue::new("cleanup");
    let (handler, seen) = recorder();
    queue.upsert_periodic("cleanup", Duration::from_secs(3600), "sweep".to_string(), 100);
    queue.start(handler);

    queue.promote();

    assert_eq!(wait_for(&seen, 1).await, vec!["sweep"]);
    queue.close();
}

#[tokio::test]
async fn test_closed_queue_runs_nothing() {
    let queue: PriorityQueue<String> = PriorityQueue::new("closed");
    let (handler, seen) = recorder();
    queue.start(handler);
    queue.close();

    queue.enqueue("late", "late".to_string(), 10);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_close_aborts_the_running_job() {
    let queue: PriorityQueue<String> = PriorityQueue::new("slow");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let handler: JobHandler<String> = Arc::new(move |payload: String| {
        let log = Arc::clone(&log);
        async move {
            log.lock().unwrap().push(format!("started {payload}"));
            tokio::time::sleep(Duration::from_millis(200)).await;
            log.lock().unwrap().push(format!("finished {payload}"));
            Ok(())
        }
        .boxed()
    });
    queue.start(handler);
    queue.enqueue("sweep", "sweep".to_string(), 10);

    assert_eq!(wait_for(&seen, 1).await, vec!["started sweep"]);
    queue.close();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(*seen.lock().unwrap(), vec!["started sweep".to_string()]);
}
