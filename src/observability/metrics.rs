//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `keycloak_operator_reconciliations_total` - Reconcile passes by kind and result
//! - `keycloak_operator_reconcile_duration_seconds` - Duration of a single reconcile pass
//! - `keycloak_operator_cleanup_actions_total` - Orphan sweep actions (delete, disown, skip)
//! - `keycloak_operator_jobs_total` - Queue jobs by queue name and result
//! - `keycloak_operator_self_updates_suppressed_total` - Watch events dropped as self-echoes
//! - `keycloak_operator_watch_restarts_total` - Watch stream restarts by kind

use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "keycloak_operator_reconciliations_total",
            "Total number of reconcile passes by kind and result",
        ),
        &["kind", "result"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILE_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "keycloak_operator_reconcile_duration_seconds",
            "Duration of a reconcile pass in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["kind"],
    )
    .expect("Failed to create RECONCILE_DURATION metric - this should never happen")
});

static CLEANUP_ACTIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "keycloak_operator_cleanup_actions_total",
            "Total number of orphan sweep actions by kind and action",
        ),
        &["kind", "action"],
    )
    .expect("Failed to create CLEANUP_ACTIONS_TOTAL metric - this should never happen")
});

static JOBS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "keycloak_operator_jobs_total",
            "Total number of queue jobs by queue and result",
        ),
        &["queue", "result"],
    )
    .expect("Failed to create JOBS_TOTAL metric - this should never happen")
});

static SELF_UPDATES_SUPPRESSED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "keycloak_operator_self_updates_suppressed_total",
            "Total number of watch events recognised as the operator's own writes",
        ),
        &["kind"],
    )
    .expect("Failed to create SELF_UPDATES_SUPPRESSED_TOTAL metric - this should never happen")
});

static WATCH_RESTARTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "keycloak_operator_watch_restarts_total",
            "Total number of watch stream restarts by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create WATCH_RESTARTS_TOTAL metric - this should never happen")
});

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILE_DURATION.clone()))?;
    REGISTRY.register(Box::new(CLEANUP_ACTIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(JOBS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SELF_UPDATES_SUPPRESSED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WATCH_RESTARTS_TOTAL.clone()))?;

    Ok(())
}

pub fn record_reconciliation(kind: &str, result: &str, duration: f64) {
    RECONCILIATIONS_TOTAL
        .with_label_values(&[kind, result])
        .inc();
    RECONCILE_DURATION.with_label_values(&[kind]).observe(duration);
}

pub fn increment_cleanup_action(kind: &str, action: &str) {
    CLEANUP_ACTIONS_TOTAL.with_label_values(&[kind, action]).inc();
}

pub fn increment_jobs(queue: &str, result: &str) {
    JOBS_TOTAL.with_label_values(&[queue, result]).inc();
}

pub fn increment_self_updates_suppressed(kind: &str) {
    SELF_UPDATES_SUPPRESSED_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_watch_restarts(kind: &str) {
    WATCH_RESTARTS_TOTAL.with_label_values(&[kind]).inc();
}
