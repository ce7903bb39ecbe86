//! # Job Queue
//!
//! In-process priority queue with a single consumer.
//!
//! - Lower priority values run first; equal priorities run in enqueue order
//! - A job already running is never preempted, so at most one job per queue is in flight
//! - Periodic schedules are upserted by name and enqueue their payload every interval,
//!   skipping the tick when a job of the same name is still pending
//! - [`JobQueue::promote`] fires every schedule immediately
//!
//! Each job runs in its own task so a panicking handler surfaces as a failed job
//! instead of killing the consumer. That task is owned by the consumer, so
//! [`JobQueue::close`] also aborts the job in flight.

use crate::error::ReconcileError;
use crate::observability::metrics;
use futures::future::BoxFuture;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

/// Async job body. Errors are logged and counted; they never stop the consumer.
pub type JobHandler<P> =
    Arc<dyn Fn(P) -> BoxFuture<'static, Result<(), ReconcileError>> + Send + Sync>;

/// Queue operations the controllers depend on.
pub trait JobQueue<P>: Send + Sync {
    fn enqueue(&self, name: &str, payload: P, priority: u32);

    /// Create or replace the schedule called `name`.
    fn upsert_periodic(&self, name: &str, every: Duration, payload: P, priority: u32);

    /// Run every schedule now instead of waiting for its next tick.
    fn promote(&self);

    /// Start the single consumer. Later calls are ignored.
    fn start(&self, handler: JobHandler<P>);

    /// Stop schedules and the consumer, aborting the job in flight.
    fn close(&self);
}

struct Pending<P> {
    priority: u32,
    seq: u64,
    name: String,
    payload: P,
}

impl<P> PartialEq for Pending<P> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl<P> Eq for Pending<P> {}

impl<P> PartialOrd for Pending<P> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for Pending<P> {
    // BinaryHeap pops the greatest element; invert so the lowest (priority, seq) wins
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (other.priority, other.seq).cmp(&(self.priority, self.seq))
    }
}

struct Schedule<P> {
    payload: P,
    priority: u32,
    ticker: JoinHandle<()>,
}

struct Inner<P> {
    name: String,
    heap: Mutex<BinaryHeap<Pending<P>>>,
    seq: AtomicU64,
    available: Notify,
    closed: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<P> Inner<P> {
    fn push(&self, name: &str, payload: P, priority: u32) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        lock(&self.heap).push(Pending {
            priority,
            seq,
            name: name.to_string(),
            payload,
        });
        self.available.notify_one();
    }

    /// Push unless a job called `name` is already waiting.
    fn push_unique(&self, name: &str, payload: P, priority: u32) -> bool {
        if lock(&self.heap).iter().any(|p| p.name == name) {
            debug!("Job {name} already pending on {}", self.name);
            return false;
        }
        self.push(name, payload, priority);
        true
    }

    fn pop(&self) -> Option<Pending<P>> {
        lock(&self.heap).pop()
    }
}

/// Priority queue backed by a binary heap.
pub struct PriorityQueue<P> {
    inner: Arc<Inner<P>>,
    schedules: Mutex<HashMap<String, Schedule<P>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<P> std::fmt::Debug for PriorityQueue<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

impl<P: Clone + Send + 'static> PriorityQueue<P> {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                heap: Mutex::new(BinaryHeap::new()),
                seq: AtomicU64::new(0),
                available: Notify::new(),
                closed: AtomicBool::new(false),
            }),
            schedules: Mutex::new(HashMap::new()),
            worker: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Names and priorities of waiting jobs, in the order they will run.
    #[must_use]
    pub fn pending(&self) -> Vec<(String, u32)> {
        let mut waiting: Vec<(u32, u64, String)> = lock(&self.inner.heap)
            .iter()
            .map(|p| (p.priority, p.seq, p.name.clone()))
            .collect();
        waiting.sort();
        waiting
            .into_iter()
            .map(|(priority, _, name)| (name, priority))
            .collect()
    }
}

impl<P: Clone + Send + 'static> JobQueue<P> for PriorityQueue<P> {
    fn enqueue(&self, name: &str, payload: P, priority: u32) {
        self.inner.push(name, payload, priority);
    }

    fn upsert_periodic(&self, name: &str, every: Duration, payload: P, priority: u32) {
        let inner = Arc::clone(&self.inner);
        let job_name = name.to_string();
        let tick_payload = payload.clone();
        let ticker = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + every, every);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                inner.push_unique(&job_name, tick_payload.clone(), priority);
            }
        });
        let previous = lock(&self.schedules).insert(
            name.to_string(),
            Schedule {
                payload,
                priority,
                ticker,
            },
        );
        if let Some(previous) = previous {
            previous.ticker.abort();
        }
    }

    fn promote(&self) {
        let schedules = lock(&self.schedules);
        for (name, schedule) in schedules.iter() {
            self.inner
                .push_unique(name, schedule.payload.clone(), schedule.priority);
        }
    }

    fn start(&self, handler: JobHandler<P>) {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            warn!("Queue {} already has a consumer", self.inner.name);
            return;
        }
        let inner = Arc::clone(&self.inner);
        *worker = Some(tokio::spawn(async move {
            // Dropped with the consumer, which aborts the running job
            let mut running = JoinSet::new();
            loop {
                let job = loop {
                    if inner.closed.load(Ordering::Acquire) {
                        return;
                    }
                    if let Some(job) = inner.pop() {
                        break job;
                    }
                    inner.available.notified().await;
                };
                debug!("Running job {} on {}", job.name, inner.name);
                running.spawn(handler(job.payload));
                let Some(outcome) = running.join_next().await else {
                    continue;
                };
                match outcome {
                    Ok(Ok(())) => metrics::increment_jobs(&inner.name, "success"),
                    Ok(Err(e)) => {
                        error!("Job {} on {} failed: {e}", job.name, inner.name);
                        metrics::increment_jobs(&inner.name, "failure");
                    }
                    Err(e) => {
                        error!("Job {} on {} panicked: {e}", job.name, inner.name);
                        metrics::increment_jobs(&inner.name, "failure");
                    }
                }
            }
        }));
    }

    fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        for (_, schedule) in lock(&self.schedules).drain() {
            schedule.ticker.abort();
        }
        if let Some(worker) = lock(&self.worker).take() {
            worker.abort();
        }
        self.inner.available.notify_one();
    }
}
