//! # Kind Controller
//!
//! Drives one custom resource kind: a reconciliation queue and a cleanup queue, each
//! with a single consumer, fed by a periodic scheduler and by watch ingestion.
//!
//! ## Watch Ingestion
//!
//! - `Added`/`Modified`: set `status.state = not-synced` when unset, then drop the event
//!   when the stored fingerprint matches its spec (the operator's own write). Otherwise
//!   enqueue the instance ahead of the periodic resync.
//! - `Deleted`: promote the cleanup schedule so the sweep runs now.
//!
//! A closed or failed watch is restarted from scratch after a Fibonacci backoff.

use super::backoff::FibonacciBackoff;
use super::cleanup::{sweep_orphans, CleanupReport};
use super::credentials::CredentialReconciler;
use super::queue::{JobHandler, JobQueue, PriorityQueue};
use super::reconciler::{ClaimReconciler, ManagedSpec};
use super::updater::CrUpdater;
use crate::config::ControllerConfig;
use crate::constants::{
    DEFAULT_RESYNC_INTERVAL_SECS, DEFAULT_WATCH_BACKOFF_MAX_SECS,
    DEFAULT_WATCH_RESTART_DELAY_SECS, PERIODIC_JOB_PRIORITY, TRIGGERED_JOB_PRIORITY,
};
use crate::crd::SyncState;
use crate::error::ReconcileError;
use crate::observability::metrics;
use crate::transport::{CrTransport, ResourceKind, Selector, WatchEvent, WatchPhase};
use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Reconcile and cleanup logic of one kind, as seen by its controller.
#[async_trait]
pub trait KindReconciler: Send + Sync + 'static {
    fn kind(&self) -> ResourceKind;

    /// Reconcile one object. Failures are recorded on the object, never returned.
    async fn reconcile(&self, object: &Value, selector: &Selector) -> SyncState;

    async fn cleanup(&self) -> Result<CleanupReport, ReconcileError>;
}

#[async_trait]
impl<S: ManagedSpec> KindReconciler for ClaimReconciler<S> {
    fn kind(&self) -> ResourceKind {
        S::kind()
    }

    async fn reconcile(&self, object: &Value, selector: &Selector) -> SyncState {
        ClaimReconciler::reconcile(self, object, selector).await
    }

    async fn cleanup(&self) -> Result<CleanupReport, ReconcileError> {
        sweep_orphans::<S>(
            self.updater().transport().as_ref(),
            self.identity().as_ref(),
        )
        .await
    }
}

#[async_trait]
impl KindReconciler for CredentialReconciler {
    fn kind(&self) -> ResourceKind {
        Self::kind()
    }

    async fn reconcile(&self, object: &Value, selector: &Selector) -> SyncState {
        CredentialReconciler::reconcile(self, object, selector).await
    }

    async fn cleanup(&self) -> Result<CleanupReport, ReconcileError> {
        CredentialReconciler::cleanup(self).await
    }
}

/// One object to reconcile, as delivered by the watch.
#[derive(Debug, Clone, PartialEq)]
pub struct JobInstance {
    pub object: Value,
    pub selector: Selector,
}

/// Payload of the reconciliation queue: every object of the kind, or the listed ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileJob {
    pub all: bool,
    pub instances: Vec<JobInstance>,
}

impl ReconcileJob {
    #[must_use]
    pub fn all() -> Self {
        Self {
            all: true,
            instances: Vec::new(),
        }
    }

    #[must_use]
    pub fn instance(object: Value, selector: Selector) -> Self {
        Self {
            all: false,
            instances: vec![JobInstance { object, selector }],
        }
    }
}

/// What watch ingestion did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The event echoed the operator's own write
    Suppressed,
    Enqueued,
    CleanupPromoted,
}

/// Point-in-time state of one kind controller, reported by the readiness probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindHealth {
    pub kind: String,
    /// Queue consumers are running
    pub workers: bool,
    /// A watch stream is open (false while backing off after a failure)
    pub watching: bool,
    pub stopped: bool,
}

/// Timing shared by every kind controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    pub resync_interval: Duration,
    pub watch_restart_delay_secs: u64,
    pub watch_backoff_max_secs: u64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS),
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_backoff_max_secs: DEFAULT_WATCH_BACKOFF_MAX_SECS,
        }
    }
}

impl From<&ControllerConfig> for ControllerSettings {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            resync_interval: config.resync_interval(),
            watch_restart_delay_secs: config.watch_restart_delay_secs,
            watch_backoff_max_secs: config.watch_backoff_max_secs,
        }
    }
}

/// Reconcile every object a job names, one after another.
async fn process_job<R: KindReconciler + ?Sized>(
    reconciler: &R,
    transport: &dyn CrTransport,
    job: ReconcileJob,
) -> Result<(), ReconcileError> {
    let kind = reconciler.kind();
    if job.all {
        let objects = transport.list(&kind).await?;
        debug!("Full resync of {} {} objects", objects.len(), kind.plural);
        for object in objects {
            match Selector::from_object(&kind, &object) {
                Ok(selector) => {
                    reconciler.reconcile(&object, &selector).await;
                }
                Err(e) => warn!("Skipping {} object: {e}", kind.plural),
            }
        }
    }
    for instance in job.instances {
        reconciler
            .reconcile(&instance.object, &instance.selector)
            .await;
    }
    Ok(())
}

pub struct KindController<R> {
    reconciler: Arc<R>,
    updater: CrUpdater,
    settings: ControllerSettings,
    reconciliation: Arc<dyn JobQueue<ReconcileJob>>,
    cleanup: Arc<dyn JobQueue<()>>,
    workers: AtomicBool,
    watching: AtomicBool,
    closed: AtomicBool,
}

impl<R: KindReconciler> std::fmt::Debug for KindController<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindController")
            .field("kind", &self.reconciler.kind().kind)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<R: KindReconciler> KindController<R> {
    /// Controller with in-process queues named after the kind's plural.
    #[must_use]
    pub fn new(reconciler: R, updater: CrUpdater, settings: ControllerSettings) -> Self {
        let plural = reconciler.kind().plural;
        Self::with_queues(
            reconciler,
            updater,
            settings,
            Arc::new(PriorityQueue::new(format!("{plural}-reconciliation"))),
            Arc::new(PriorityQueue::new(format!("{plural}-cleanup"))),
        )
    }

    #[must_use]
    pub fn with_queues(
        reconciler: R,
        updater: CrUpdater,
        settings: ControllerSettings,
        reconciliation: Arc<dyn JobQueue<ReconcileJob>>,
        cleanup: Arc<dyn JobQueue<()>>,
    ) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            updater,
            settings,
            reconciliation,
            cleanup,
            workers: AtomicBool::new(false),
            watching: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn reconciler(&self) -> &Arc<R> {
        &self.reconciler
    }

    fn job_name(&self, job: &str) -> String {
        format!("{}-{job}", self.reconciler.kind().plural)
    }

    /// Upsert the periodic full resync and cleanup schedules.
    pub fn schedule(&self) {
        let every = self.settings.resync_interval;
        self.reconciliation.upsert_periodic(
            &self.job_name("full-resync"),
            every,
            ReconcileJob::all(),
            PERIODIC_JOB_PRIORITY,
        );
        self.cleanup.upsert_periodic(
            &self.job_name("cleanup"),
            every,
            (),
            PERIODIC_JOB_PRIORITY,
        );
    }

    /// Start the single consumer of both queues.
    pub fn start_workers(&self) {
        let reconciler = Arc::clone(&self.reconciler);
        let transport = Arc::clone(self.updater.transport());
        let reconcile: JobHandler<ReconcileJob> = Arc::new(move |job| {
            let reconciler = Arc::clone(&reconciler);
            let transport = Arc::clone(&transport);
            async move { process_job(reconciler.as_ref(), transport.as_ref(), job).await }.boxed()
        });
        self.reconciliation.start(reconcile);

        let reconciler = Arc::clone(&self.reconciler);
        let cleanup: JobHandler<()> = Arc::new(move |()| {
            let reconciler = Arc::clone(&reconciler);
            async move {
                let report = reconciler.cleanup().await?;
                debug!(
                    "Cleanup of {}: {} deleted, {} disowned, {} skipped",
                    reconciler.kind().plural,
                    report.deleted,
                    report.disowned,
                    report.skipped
                );
                Ok::<_, ReconcileError>(())
            }
            .boxed()
        });
        self.cleanup.start(cleanup);
        self.workers.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn health(&self) -> KindHealth {
        let stopped = self.closed.load(Ordering::Acquire);
        KindHealth {
            kind: self.reconciler.kind().kind,
            workers: !stopped && self.workers.load(Ordering::Acquire),
            watching: !stopped && self.watching.load(Ordering::Acquire),
            stopped,
        }
    }

    pub fn promote_cleanup(&self) {
        debug!("Promoting cleanup of {}", self.reconciler.kind().plural);
        self.cleanup.promote();
    }

    /// Run a reconciliation job inline, bypassing the queue.
    pub async fn process(&self, job: ReconcileJob) -> Result<(), ReconcileError> {
        process_job(
            self.reconciler.as_ref(),
            self.updater.transport().as_ref(),
            job,
        )
        .await
    }

    /// Watch ingestion for a single event.
    pub async fn on_event(&self, event: WatchEvent) -> Result<EventOutcome, ReconcileError> {
        let kind = self.reconciler.kind();
        if event.phase == WatchPhase::Deleted {
            self.promote_cleanup();
            return Ok(EventOutcome::CleanupPromoted);
        }

        let selector = Selector::from_object(&kind, &event.object)?;
        debug!("Event received for {selector}: {:?}", event.phase);
        if event.object.pointer("/status/state").is_none_or(Value::is_null) {
            self.updater
                .update_state(&selector, SyncState::NotSynced)
                .await?;
        }

        if self.updater.hashes().matches(&event.object).await? {
            debug!("Ignoring own update of {selector}");
            metrics::increment_self_updates_suppressed(&kind.kind);
            return Ok(EventOutcome::Suppressed);
        }
        self.reconciliation.enqueue(
            &self.job_name("reconcile"),
            ReconcileJob::instance(event.object, selector),
            TRIGGERED_JOB_PRIORITY,
        );
        Ok(EventOutcome::Enqueued)
    }

    /// Consume the watch until shutdown, restarting it whenever it closes.
    pub async fn watch(&self) {
        let kind = self.reconciler.kind();
        let transport = Arc::clone(self.updater.transport());
        let mut backoff = FibonacciBackoff::new(
            self.settings.watch_restart_delay_secs,
            self.settings.watch_backoff_max_secs,
        );
        while !self.closed.load(Ordering::Acquire) {
            info!("Watching {}", kind.plural);
            let mut events = transport.watch(&kind);
            self.watching.store(true, Ordering::Release);
            while let Some(item) = events.next().await {
                match item {
                    Ok(event) => {
                        backoff.reset();
                        if let Err(e) = self.on_event(event).await {
                            error!("Failed to handle {} event: {e}", kind.plural);
                        }
                    }
                    Err(e) => {
                        error!("Watch of {} failed: {e}", kind.plural);
                        break;
                    }
                }
            }
            self.watching.store(false, Ordering::Release);
            if self.closed.load(Ordering::Acquire) {
                break;
            }
            metrics::increment_watch_restarts(&kind.kind);
            let delay = backoff.next_backoff();
            warn!(
                "Connection to {} watch closed, restarting in {}s",
                kind.plural,
                delay.as_secs()
            );
            tokio::time::sleep(delay).await;
        }
        info!("Stopped watching {}", kind.plural);
    }

    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.reconciliation.close();
        self.cleanup.close();
    }
}

/// Object-safe view of a [`KindController`] used by process bootstrap.
#[async_trait]
pub trait Operator: Send + Sync {
    fn kind(&self) -> ResourceKind;

    fn schedule(&self);

    fn start_workers(&self);

    fn promote_cleanup(&self);

    async fn watch(&self);

    fn health(&self) -> KindHealth;

    fn shutdown(&self);
}

#[async_trait]
impl<R: KindReconciler> Operator for KindController<R> {
    fn kind(&self) -> ResourceKind {
        self.reconciler.kind()
    }

    fn schedule(&self) {
        KindController::schedule(self);
    }

    fn start_workers(&self) {
        KindController::start_workers(self);
    }

    fn promote_cleanup(&self) {
        KindController::promote_cleanup(self);
    }

    async fn watch(&self) {
        KindController::watch(self).await;
    }

    fn health(&self) -> KindHealth {
        KindController::health(self)
    }

    fn shutdown(&self) {
        KindController::shutdown(self);
    }
}
