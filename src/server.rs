//! # HTTP Server
//!
//! Metrics and Kubernetes probe endpoints:
//! - `/metrics` - Prometheus metrics in text format
//! - `/healthz` - Liveness probe (503 once a kind controller has stopped)
//! - `/readyz` - Readiness probe (200 while every kind controller is healthy)
//!
//! Both probes read the state reported by the registered kind controllers, so a
//! watch stuck in backoff or a controller that never started its workers shows
//! up as not ready.

use crate::controller::kind::{KindHealth, Operator};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use tokio::net::TcpListener;
use tracing::{error, info};

/// Which parts of a kind controller must be running for the process to be ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirements {
    pub workers: bool,
    pub watch: bool,
}

pub struct ServerState {
    requirements: Requirements,
    operators: OnceLock<Vec<Arc<dyn Operator>>>,
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("requirements", &self.requirements)
            .field("registered", &self.operators.get().map(Vec::len))
            .finish_non_exhaustive()
    }
}

/// Body of `/readyz` and `/healthz`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub ok: bool,
    pub kinds: Vec<KindHealth>,
}

impl ServerState {
    #[must_use]
    pub fn new(requirements: Requirements) -> Self {
        Self {
            requirements,
            operators: OnceLock::new(),
        }
    }

    /// Hand the started controllers to the probes. Later calls are ignored.
    pub fn register(&self, operators: Vec<Arc<dyn Operator>>) {
        if self.operators.set(operators).is_err() {
            error!("Operators were already registered with the HTTP server");
        }
    }

    fn kinds(&self) -> Vec<KindHealth> {
        self.operators
            .get()
            .map(|operators| operators.iter().map(|operator| operator.health()).collect())
            .unwrap_or_default()
    }

    /// Ready when controllers are registered and each one runs what is required.
    #[must_use]
    pub fn readiness(&self) -> Report {
        let kinds = self.kinds();
        let ok = !kinds.is_empty()
            && kinds.iter().all(|kind| {
                !kind.stopped
                    && (!self.requirements.workers || kind.workers)
                    && (!self.requirements.watch || kind.watching)
            });
        Report { ok, kinds }
    }

    /// Alive until a registered controller has been stopped.
    #[must_use]
    pub fn liveness(&self) -> Report {
        let kinds = self.kinds();
        let ok = kinds.iter().all(|kind| !kind.stopped);
        Report { ok, kinds }
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(state)
}

pub async fn start_server(port: u16, state: Arc<ServerState>) -> Result<(), anyhow::Error> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router(state)).await?;

    Ok(())
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = crate::observability::metrics::REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
}

fn respond(report: Report) -> (StatusCode, Json<Report>) {
    let status = if report.ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

async fn healthz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    respond(state.liveness())
}

async fn readyz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    respond(state.readiness())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ResourceKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedHealth(Mutex<KindHealth>);

    impl FixedHealth {
        fn new(workers: bool, watching: bool) -> Arc<Self> {
            Arc::new(Self(Mutex::new(KindHealth {
                kind: "KeycloakGroup".to_string(),
                workers,
                watching,
                stopped: false,
            })))
        }

        fn set(&self, update: impl FnOnce(&mut KindHealth)) {
            let mut health = self.0.lock().unwrap();
            update(&mut *health);
        }
    }

    #[async_trait]
    impl Operator for FixedHealth {
        fn kind(&self) -> ResourceKind {
            ResourceKind {
                group: "k8s.rightcrowd.com".to_string(),
                version: "v1alpha1".to_string(),
                kind: "KeycloakGroup".to_string(),
                plural: "keycloakgroups".to_string(),
                namespaced: false,
            }
        }
        fn schedule(&self) {}
        fn start_workers(&self) {}
        fn promote_cleanup(&self) {}
        async fn watch(&self) {}
        fn health(&self) -> KindHealth {
            self.0.lock().unwrap().clone()
        }
        fn shutdown(&self) {}
    }

    fn all_required() -> Requirements {
        Requirements {
            workers: true,
            watch: true,
        }
    }

    fn register(state: &ServerState, operators: &[Arc<FixedHealth>]) {
        state.register(
            operators
                .iter()
                .map(|operator| Arc::clone(operator) as Arc<dyn Operator>)
                .collect(),
        );
    }

    #[test]
    fn test_not_ready_before_controllers_register() {
        let state = ServerState::new(all_required());
        assert!(!state.readiness().ok);
        assert!(state.liveness().ok);
    }

    #[test]
    fn test_ready_follows_watch_state() {
        let state = ServerState::new(all_required());
        let groups = FixedHealth::new(true, true);
        let users = FixedHealth::new(true, true);
        register(&state, &[Arc::clone(&groups), Arc::clone(&users)]);
        assert!(state.readiness().ok);

        // Watch dropped and backing off
        users.set(|health| health.watching = false);
        let report = state.readiness();
        assert!(!report.ok);
        assert_eq!(report.kinds.len(), 2);
        assert!(state.liveness().ok);

        users.set(|health| health.watching = true);
        assert!(state.readiness().ok);
    }

    #[test]
    fn test_disabled_parts_are_not_required() {
        let state = ServerState::new(Requirements {
            workers: true,
            watch: false,
        });
        let groups = FixedHealth::new(true, false);
        register(&state, &[Arc::clone(&groups)]);
        assert!(state.readiness().ok);

        groups.set(|health| health.workers = false);
        assert!(!state.readiness().ok);
    }

    #[test]
    fn test_stopped_controller_fails_liveness_and_readiness() {
        let state = ServerState::new(all_required());
        let groups = FixedHealth::new(true, true);
        register(&state, &[Arc::clone(&groups)]);

        groups.set(|health| health.stopped = true);
        assert!(!state.readiness().ok);
        assert!(!state.liveness().ok);
    }

    #[tokio::test]
    async fn test_readyz_returns_service_unavailable_with_kind_report() {
        let state = ServerState::new(all_required());
        register(&state, &[FixedHealth::new(true, false)]);

        let response = readyz_handler(State(Arc::new(state))).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
