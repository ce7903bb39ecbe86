//! # Client Credential Export Tests
//!
//! [`CredentialReconciler`] writing client ids and secrets into Kubernetes Secrets:
//! ownership checks, fallback strategies, templates and cleanup.

mod common;

use common::Harness;
use keycloak_realm_operator::constants::SECRET_SOURCE_ANNOTATION_KEY;
use keycloak_realm_operator::controller::cleanup::CleanupReport;
use keycloak_realm_operator::controller::credentials::CredentialReconciler;
use keycloak_realm_operator::crd::SyncState;
use keycloak_realm_operator::identity::{ResourceType, Scope};
use keycloak_realm_operator::secrets::ManagedSecret;
use keycloak_realm_operator::transport::EventType;
use serde_json::{json, Value};
use std::collections::BTreeMap;

fn seed_portal_client(h: &Harness) {
    h.identity.seed_realm("acme");
    h.identity.seed(
        ResourceType::Client,
        &Scope::Realm("acme".to_string()),
        json!({"clientId": "portal", "secret": "s3cr3t"}),
    );
}

fn credential_spec(extra: Value) -> Value {
    let mut spec = json!({
        "targetSecretName": "portal-credentials",
        "realm": "acme",
        "clientId": "portal"
    });
    if let (Some(spec), Value::Object(extra)) = (spec.as_object_mut(), extra) {
        spec.extend(extra);
    }
    spec
}

fn owned_secret(owner: &str) -> ManagedSecret {
    ManagedSecret {
        name: "portal-credentials".to_string(),
        namespace: "apps".to_string(),
        annotations: BTreeMap::from([(
            SECRET_SOURCE_ANNOTATION_KEY.to_string(),
            owner.to_string(),
        )]),
        data: BTreeMap::from([("clientSecret".to_string(), "stale".to_string())]),
    }
}

#[tokio::test]
async fn test_credentials_are_written_with_default_keys() {
    let h = Harness::new();
    seed_portal_client(&h);
    let (object, selector) = h.cr(
        &CredentialReconciler::kind(),
        "portal",
        Some("apps"),
        credential_spec(json!({})),
    );

    let state = h.credential_reconciler().reconcile(&object, &selector).await;

    assert_eq!(state, SyncState::Synced);
    let secret = h
        .secrets
        .secret("apps", "portal-credentials")
        .expect("secret written");
    assert_eq!(secret.annotation(SECRET_SOURCE_ANNOTATION_KEY), Some("portal"));
    assert_eq!(
        secret.data,
        BTreeMap::from([
            ("clientId".to_string(), "portal".to_string()),
            ("clientSecret".to_string(), "s3cr3t".to_string()),
            ("realm".to_string(), "acme".to_string()),
        ])
    );
    assert_eq!(h.transport.state(&selector).as_deref(), Some("synced"));
    assert_eq!(h.transport.reasons(), vec!["Syncing", "Synced"]);
}

#[tokio::test]
async fn test_owned_secret_is_replaced() {
    let h = Harness::new();
    seed_portal_client(&h);
    h.secrets.put(owned_secret("portal"));
    let (object, selector) = h.cr(
        &CredentialReconciler::kind(),
        "portal",
        Some("apps"),
        credential_spec(json!({})),
    );

    let state = h.credential_reconciler().reconcile(&object, &selector).await;

    assert_eq!(state, SyncState::Synced);
    let secret = h.secrets.secret("apps", "portal-credentials").expect("secret");
    assert_eq!(
        secret.data.get("clientSecret").map(String::as_str),
        Some("s3cr3t")
    );
}

#[tokio::test]
async fn test_foreign_secret_is_never_overwritten() {
    let h = Harness::new();
    seed_portal_client(&h);
    let mut foreign = owned_secret("someone-else");
    foreign.annotations.clear();
    h.secrets.put(foreign.clone());
    let (object, selector) = h.cr(
        &CredentialReconciler::kind(),
        "portal",
        Some("apps"),
        credential_spec(json!({})),
    );

    let state = h.credential_reconciler().reconcile(&object, &selector).await;

    assert_eq!(state, SyncState::Failed);
    assert_eq!(h.secrets.secret("apps", "portal-credentials"), Some(foreign));
    let failure = h
        .transport
        .events()
        .into_iter()
        .find(|e| e.reason == "Failed")
        .expect("failure event");
    assert_eq!(failure.event_type, EventType::Warning);
    assert!(failure.message.contains("apps/portal-credentials"));
}

#[tokio::test]
async fn test_secret_owned_by_another_resource_is_rejected() {
    let h = Harness::new();
    seed_portal_client(&h);
    h.secrets.put(owned_secret("other-credential"));
    let (object, selector) = h.cr(
        &CredentialReconciler::kind(),
        "portal",
        Some("apps"),
        credential_spec(json!({})),
    );

    let state = h.credential_reconciler().reconcile(&object, &selector).await;

    assert_eq!(state, SyncState::Failed);
    let secret = h.secrets.secret("apps", "portal-credentials").expect("secret");
    assert_eq!(secret.data.get("clientSecret").map(String::as_str), Some("stale"));
}

#[tokio::test]
async fn test_missing_client_with_skip_fails_quietly() {
    let h = Harness::new();
    h.identity.seed_realm("acme");
    let (object, selector) = h.cr(
        &CredentialReconciler::kind(),
        "portal",
        Some("apps"),
        credential_spec(json!({})),
    );

    let state = h.credential_reconciler().reconcile(&object, &selector).await;

    assert_eq!(state, SyncState::Failed);
    assert_eq!(h.transport.state(&selector).as_deref(), Some("failed"));
    assert_eq!(h.transport.reasons(), vec!["ClientUnavailable"]);
    assert!(h.secrets.secret("apps", "portal-credentials").is_none());
}

#[tokio::test]
async fn test_missing_realm_with_error_strategy_fails_loudly() {
    let h = Harness::new();
    let (object, selector) = h.cr(
        &CredentialReconciler::kind(),
        "portal",
        Some("apps"),
        credential_spec(json!({"fallbackStrategy": "error"})),
    );

    let state = h.credential_reconciler().reconcile(&object, &selector).await;

    assert_eq!(state, SyncState::Failed);
    assert_eq!(h.transport.reasons(), vec!["ClientUnavailable", "Failed"]);
}

#[tokio::test]
async fn test_public_client_without_secret_is_unavailable() {
    let h = Harness::new();
    h.identity.seed_realm("acme");
    h.identity.seed(
        ResourceType::Client,
        &Scope::Realm("acme".to_string()),
        json!({"clientId": "portal", "publicClient": true}),
    );
    let (object, selector) = h.cr(
        &CredentialReconciler::kind(),
        "portal",
        Some("apps"),
        credential_spec(json!({})),
    );

    let state = h.credential_reconciler().reconcile(&object, &selector).await;

    assert_eq!(state, SyncState::Failed);
    assert!(h.secrets.secret("apps", "portal-credentials").is_none());
}

#[tokio::test]
async fn test_templates_replace_default_keys() {
    let h = Harness::new();
    seed_portal_client(&h);
    let (object, selector) = h.cr(
        &CredentialReconciler::kind(),
        "portal",
        Some("apps"),
        credential_spec(json!({
            "targetSecretTemplate": [
                {"key": "OIDC_URL", "template": "https://sso.example.com/realms/{{ .realm }}"},
                {"key": "BASIC_AUTH", "template": "{{ .clientId }}:{{ .clientSecret }}"}
            ]
        })),
    );

    let state = h.credential_reconciler().reconcile(&object, &selector).await;

    assert_eq!(state, SyncState::Synced);
    let secret = h.secrets.secret("apps", "portal-credentials").expect("secret");
    assert_eq!(
        secret.data,
        BTreeMap::from([
            (
                "OIDC_URL".to_string(),
                "https://sso.example.com/realms/acme".to_string()
            ),
            ("BASIC_AUTH".to_string(), "portal:s3cr3t".to_string()),
        ])
    );
}

#[tokio::test]
async fn test_invalid_template_fails_the_pass() {
    let h = Harness::new();
    seed_portal_client(&h);
    let (object, selector) = h.cr(
        &CredentialReconciler::kind(),
        "portal",
        Some("apps"),
        credential_spec(json!({
            "targetSecretTemplate": [{"key": "PASSWORD", "template": "{{ .password }}"}]
        })),
    );

    let state = h.credential_reconciler().reconcile(&object, &selector).await;

    assert_eq!(state, SyncState::Failed);
    assert!(h.secrets.secret("apps", "portal-credentials").is_none());
}

#[tokio::test]
async fn test_cleanup_deletes_only_untargeted_exports() {
    let h = Harness::new();
    seed_portal_client(&h);
    let (object, selector) = h.cr(
        &CredentialReconciler::kind(),
        "portal",
        Some("apps"),
        credential_spec(json!({})),
    );
    let reconciler = h.credential_reconciler();
    reconciler.reconcile(&object, &selector).await;

    let mut leftover = owned_secret("retired");
    leftover.name = "retired-credentials".to_string();
    h.secrets.put(leftover);
    h.secrets.put(ManagedSecret {
        name: "unrelated".to_string(),
        namespace: "apps".to_string(),
        ..ManagedSecret::default()
    });

    let report = reconciler.cleanup().await.expect("cleanup");

    assert_eq!(
        report,
        CleanupReport {
            deleted: 1,
            disowned: 0,
            skipped: 0
        }
    );
    assert!(h.secrets.secret("apps", "retired-credentials").is_none());
    assert!(h.secrets.secret("apps", "portal-credentials").is_some());
    assert!(h.secrets.secret("apps", "unrelated").is_some());
}

#[tokio::test]
async fn test_same_secret_name_in_another_namespace_is_not_targeted() {
    let h = Harness::new();
    h.cr(
        &CredentialReconciler::kind(),
        "portal",
        Some("apps"),
        credential_spec(json!({})),
    );
    let mut elsewhere = owned_secret("portal");
    elsewhere.namespace = "staging".to_string();
    h.secrets.put(elsewhere);

    let report = h.credential_reconciler().cleanup().await.expect("cleanup");

    assert_eq!(report.deleted, 1);
    assert!(h.secrets.secret("staging", "portal-credentials").is_none());
}
