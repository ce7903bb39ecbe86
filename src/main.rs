//! # Keycloak Realm Operator
//!
//! Kubernetes operator that reconciles Keycloak realms, clients, client scopes, groups
//! and users from custom resources, and exports client credentials into Secrets.
//!
//! ## Startup
//!
//! 1. Load and validate configuration from the environment
//! 2. Initialise logging and metrics, start the probe server
//! 3. Connect to the cluster, the shared store and Keycloak
//! 4. Per kind: upsert the resync and cleanup schedules, start the queue consumers,
//!    run a cleanup sweep right away and start the watch
//! 5. On SIGINT/SIGTERM mark not ready, stop every kind and close the shared store

use anyhow::{Context, Result};
use keycloak_realm_operator::config::ControllerConfig;
use keycloak_realm_operator::controller::hashing::HashStore;
use keycloak_realm_operator::controller::kind::ControllerSettings;
use keycloak_realm_operator::controller::updater::CrUpdater;
use keycloak_realm_operator::controller::OperatorContext;
use keycloak_realm_operator::identity::{KeycloakAdminClient, KeycloakSettings};
use keycloak_realm_operator::observability::metrics;
use keycloak_realm_operator::secrets::KubeSecretStore;
use keycloak_realm_operator::server::{start_server, Requirements, ServerState};
use keycloak_realm_operator::store::{RedisStore, SharedStore};
use keycloak_realm_operator::transport::KubeTransport;
use kube::Client;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &ControllerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_lowercase()));
    if config.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Required for rustls 0.23+ before any TLS connection is made
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    let config = ControllerConfig::from_env().context("Invalid operator configuration")?;
    init_tracing(&config);

    info!("Starting Keycloak Realm Operator");
    info!(
        "Build info: datetime={}, git_hash={}",
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    info!("Configuration: {config:?}");

    metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::new(Requirements {
        workers: config.enable_workers,
        watch: config.enable_kubernetes_watchers,
    }));
    let server_port = config.metrics_port;
    let probe_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, probe_state).await {
            error!("HTTP server error: {}", e);
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let store: Arc<dyn SharedStore> = Arc::new(
        RedisStore::new(&config.redis_connection_string)
            .context("Invalid shared store connection string")?,
    );
    let hashes = Arc::new(HashStore::new(Arc::clone(&store)));
    let identity = Arc::new(
        KeycloakAdminClient::new(KeycloakSettings::from(&config))
            .context("Failed to create Keycloak admin client")?,
    );
    let context = OperatorContext {
        updater: CrUpdater::new(Arc::new(KubeTransport::new(client.clone())), hashes),
        identity,
        secrets: Arc::new(KubeSecretStore::new(client)),
        settings: ControllerSettings::from(&config),
    };

    let operators = context.operators();
    for operator in &operators {
        operator.schedule();
        if config.enable_workers {
            operator.start_workers();
        }
        operator.promote_cleanup();
    }
    server_state.register(operators.clone());

    let mut watchers = Vec::new();
    if config.enable_kubernetes_watchers {
        for operator in &operators {
            let operator = Arc::clone(operator);
            watchers.push(tokio::spawn(async move { operator.watch().await }));
        }
    } else {
        info!("Kubernetes watchers are disabled");
    }

    shutdown_signal().await;
    info!("Received shutdown signal, stopping");
    for operator in &operators {
        operator.shutdown();
    }
    for watcher in watchers {
        watcher.abort();
    }
    store.close().await;

    info!("Operator stopped");
    Ok(())
}
