//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! Defaults can be overridden through the environment where
//! [`crate::config::ControllerConfig`] reads a matching variable.

/// API group of every custom resource served by the operator
pub const CRD_GROUP: &str = "k8s.rightcrowd.com";

/// API version of every custom resource served by the operator
pub const CRD_VERSION: &str = "v1alpha1";

/// Namespace of every attribute the operator writes on identity-service objects
pub const ATTRIBUTE_PREFIX: &str = "k8s.rightcrowd.com/keycloak-realm-operator";

/// Attribute key marking an identity-service object as owned by the operator
pub const CLAIM_ATTRIBUTE_KEY: &str = "k8s.rightcrowd.com/keycloak-realm-operator/claim";

/// Value the claim attribute must carry
pub const CLAIM_ATTRIBUTE_VALUE: &str = "true";

/// Attribute key holding the JSON snapshot of the last applied spec
pub const SPEC_SNAPSHOT_ATTRIBUTE_KEY: &str =
    "k8s.rightcrowd.com/keycloak-realm-operator/cr-spec-serialized";

/// Annotation key holding the salted fingerprint of a custom resource spec
pub const FINGERPRINT_ANNOTATION_KEY: &str =
    "k8s.rightcrowd.com/keycloak-realm-operator/managed-hash";

/// Annotation linking an exported Kubernetes Secret to the credential resource that owns it
pub const SECRET_SOURCE_ANNOTATION_KEY: &str = "k8s.rightcrowd.com/keycloak-realm-operator-source";

/// Shared store key of the process-wide hashing salt
pub const HASHING_SALT_KEY: &str = "crd-mgmt:hashing-salt";

/// Name reported as the source of audit events and field manager of patches
pub const OPERATOR_NAME: &str = "keycloak-realm-operator";

/// Priority of jobs enqueued by watch events (lower value runs first)
pub const TRIGGERED_JOB_PRIORITY: u32 = 10;

/// Priority of jobs enqueued by the periodic schedulers
pub const PERIODIC_JOB_PRIORITY: u32 = 100;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default period of the full-resync and cleanup schedulers (seconds)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 60;

/// Default delay before restarting a watch stream (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 1;

/// Default upper bound of the watch restart backoff (seconds)
pub const DEFAULT_WATCH_BACKOFF_MAX_SECS: u64 = 60;

/// Default identity-service request timeout (seconds)
pub const DEFAULT_KEYCLOAK_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default realm used for the admin password grant
pub const DEFAULT_KEYCLOAK_ADMIN_REALM: &str = "master";

/// Default client used for the admin password grant
pub const DEFAULT_KEYCLOAK_ADMIN_CLIENT_ID: &str = "admin-cli";

/// Upper bound of the margin before token expiry at which the token is refreshed (seconds)
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 300;

/// Page size used when listing identity-service collections
pub const KEYCLOAK_PAGE_SIZE: usize = 100;
