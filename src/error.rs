//! # Errors
//!
//! Typed error taxonomy shared by the reconciliation engine and its collaborators.
//!
//! Every variant of [`ReconcileError`] ends a reconcile pass with `status.state = failed`.
//! Nothing here is retried in place: the periodic resync is the retry mechanism.

use thiserror::Error;

/// Invalid or missing environment configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Failures of the identity-service (Keycloak admin REST) client.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Request to identity service failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Identity service returned {status} for {method} {path}: {body}")]
    Status {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    #[error("Authentication against identity service failed: {0}")]
    Auth(String),

    #[error("Identity service created a resource at {0} but did not return its id")]
    MissingId(String),

    #[error("Identity service lost {0} right after creating it")]
    Vanished(String),

    #[error("Invalid identity service URL: {0}")]
    Url(String),
}

impl IdentityError {
    /// The identity service answered 404.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

/// Failures of the custom resource watch/patch transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Custom resource {0} not found")]
    NotFound(String),

    #[error("Malformed custom resource {name}: {reason}")]
    Malformed { name: String, reason: String },

    #[error("Watch stream error: {0}")]
    Watch(#[from] kube_runtime::watcher::Error),
}

/// Failures of the Kubernetes Secret store.
#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Secret {namespace}/{name} key {key} is not valid UTF-8")]
    InvalidUtf8 {
        namespace: String,
        name: String,
        key: String,
    },
}

/// Failures of the shared store holding the hashing salt.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Shared store connection is closed")]
    Closed,
}

/// Why a single reconcile pass ended in `failed`.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Realm {0} not found")]
    ParentScopeMissing(String),

    #[error("{0} is not claimed and claiming is disabled")]
    Unclaimable(String),

    #[error("Target secret {namespace}/{name} exists but is not managed by this operator")]
    ForeignSecret { namespace: String, name: String },

    #[error("Client {client_id} in realm {realm} has no id or secret, or does not exist")]
    CredentialUnavailable { realm: String, client_id: String },

    #[error("Invalid secret template for key {key}: {reason}")]
    Template { key: String, reason: String },

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Secret(#[from] SecretStoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Problems with one orphan during the cleanup sweep. Logged and skipped, never propagated.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("Could not recover last applied spec of {resource}: {reason}")]
    MalformedRecoveredSpec { resource: String, reason: String },
}
