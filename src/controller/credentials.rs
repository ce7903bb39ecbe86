//! # Client Credential Export
//!
//! Writes the id and secret of a Keycloak client into a Kubernetes Secret next to the
//! `KeycloakClientCredential` resource.
//!
//! Exported Secrets carry a source annotation naming the owning resource. A Secret
//! without it, or owned by another resource, is never overwritten. Cleanup deletes
//! annotated Secrets no resource targets any more.

use super::cleanup::CleanupReport;
use super::reconciler::ManagedObject;
use super::updater::CrUpdater;
use crate::constants::SECRET_SOURCE_ANNOTATION_KEY;
use crate::crd::{
    FallbackStrategy, KeycloakClientCredential, KeycloakClientCredentialSpec, SecretTemplate,
    SyncState,
};
use crate::error::{IdentityError, ReconcileError};
use crate::identity::{IdentityApi, Representation, ResourceType, Scope};
use crate::observability::metrics;
use crate::secrets::{ManagedSecret, SecretStore};
use crate::transport::{AuditEvent, ResourceKind, Selector};
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

const TEMPLATE_VARIABLE: &str = r"\{\{\s*\.(\w+)\s*\}\}";

/// Values available to secret templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub realm: String,
}

impl ClientCredentials {
    fn variable(&self, name: &str) -> Option<&str> {
        match name {
            "clientId" => Some(&self.client_id),
            "clientSecret" => Some(&self.client_secret),
            "realm" => Some(&self.realm),
            _ => None,
        }
    }
}

/// Replace every `{{ .name }}` in `template`. Unknown names are an error.
pub fn render_template(
    key: &str,
    template: &str,
    credentials: &ClientCredentials,
) -> Result<String, ReconcileError> {
    let pattern = Regex::new(TEMPLATE_VARIABLE).map_err(|e| ReconcileError::Template {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;
    for captures in pattern.captures_iter(template) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let value =
            credentials
                .variable(name.as_str())
                .ok_or_else(|| ReconcileError::Template {
                    key: key.to_string(),
                    reason: format!("unknown variable .{}", name.as_str()),
                })?;
        rendered.push_str(&template[last..whole.start()]);
        rendered.push_str(value);
        last = whole.end();
    }
    rendered.push_str(&template[last..]);
    Ok(rendered)
}

/// Data of the exported Secret: rendered templates when given, `keys` otherwise.
pub fn secret_data(
    spec: &KeycloakClientCredentialSpec,
    credentials: &ClientCredentials,
) -> Result<BTreeMap<String, String>, ReconcileError> {
    match &spec.target_secret_template {
        Some(templates) => templates
            .iter()
            .map(|SecretTemplate { key, template }| {
                Ok((key.clone(), render_template(key, template, credentials)?))
            })
            .collect(),
        None => Ok(BTreeMap::from([
            (
                spec.keys.client_id_property.clone(),
                credentials.client_id.clone(),
            ),
            (
                spec.keys.client_secret_property.clone(),
                credentials.client_secret.clone(),
            ),
            (spec.keys.realm_property.clone(), credentials.realm.clone()),
        ])),
    }
}

pub struct CredentialReconciler {
    identity: Arc<dyn IdentityApi>,
    secrets: Arc<dyn SecretStore>,
    updater: CrUpdater,
}

impl std::fmt::Debug for CredentialReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialReconciler").finish_non_exhaustive()
    }
}

impl CredentialReconciler {
    #[must_use]
    pub fn new(
        identity: Arc<dyn IdentityApi>,
        secrets: Arc<dyn SecretStore>,
        updater: CrUpdater,
    ) -> Self {
        Self {
            identity,
            secrets,
            updater,
        }
    }

    #[must_use]
    pub fn kind() -> ResourceKind {
        ResourceKind::of::<KeycloakClientCredential>()
    }

    #[must_use]
    pub fn updater(&self) -> &CrUpdater {
        &self.updater
    }

    /// Reconcile one credential resource. Never fails: errors end in `status.state = failed`.
    pub async fn reconcile(&self, object: &Value, selector: &Selector) -> SyncState {
        let span = info_span!(
            "reconciler.reconcile",
            resource.kind = %selector.kind.kind,
            resource.name = %selector.name,
            resource.namespace = selector.namespace.as_deref().unwrap_or(""),
        );
        async move {
            let started = Instant::now();
            let uid = object.pointer("/metadata/uid").and_then(Value::as_str);
            let state = match self.try_reconcile(object, selector).await {
                Ok(state) => state,
                Err(e) => {
                    error!("Error reconciling {selector}: {e}");
                    if let Err(e) = self.updater.update_state(selector, SyncState::Failed).await {
                        error!("Could not mark {selector} as failed: {e}");
                    }
                    self.emit(selector, uid, AuditEvent::warning("Failed", e.to_string()))
                        .await;
                    SyncState::Failed
                }
            };
            metrics::record_reconciliation(
                &selector.kind.kind,
                state.as_str(),
                started.elapsed().as_secs_f64(),
            );
            state
        }
        .instrument(span)
        .await
    }

    async fn emit(&self, selector: &Selector, uid: Option<&str>, event: AuditEvent) {
        if let Err(e) = self.updater.log_event(selector, uid, &event).await {
            warn!("Could not publish {} event for {selector}: {e}", event.reason);
        }
    }

    async fn try_reconcile(
        &self,
        object: &Value,
        selector: &Selector,
    ) -> Result<SyncState, ReconcileError> {
        self.updater
            .update_state(selector, SyncState::Syncing)
            .await?;
        let parsed = ManagedObject::<KeycloakClientCredentialSpec>::from_value(object)?;
        let uid = parsed.uid();
        let spec = &parsed.spec;
        let owner = parsed.name();
        let namespace = selector.namespace.clone().unwrap_or_default();

        let existing = self
            .secrets
            .get(&namespace, &spec.target_secret_name)
            .await?;
        if let Some(existing) = &existing {
            if existing.annotation(SECRET_SOURCE_ANNOTATION_KEY) != Some(owner) {
                return Err(ReconcileError::ForeignSecret {
                    namespace,
                    name: spec.target_secret_name.clone(),
                });
            }
        }

        let Some(credentials) = self.resolve(spec).await? else {
            warn!(
                "Client {} in realm {} is unavailable for {selector}",
                spec.client_id, spec.realm
            );
            self.updater
                .update_state(selector, SyncState::Failed)
                .await?;
            self.emit(
                selector,
                uid,
                AuditEvent::warning(
                    "ClientUnavailable",
                    format!(
                        "Client {} in realm {} has no id or secret, or does not exist",
                        spec.client_id, spec.realm
                    ),
                ),
            )
            .await;
            return match spec.fallback_strategy {
                FallbackStrategy::Skip => Ok(SyncState::Failed),
                FallbackStrategy::Error => Err(ReconcileError::CredentialUnavailable {
                    realm: spec.realm.clone(),
                    client_id: spec.client_id.clone(),
                }),
            };
        };

        self.emit(
            selector,
            uid,
            AuditEvent::normal(
                "Syncing",
                format!("Writing credentials of client {}", spec.client_id),
            ),
        )
        .await;
        let secret = ManagedSecret {
            name: spec.target_secret_name.clone(),
            namespace: namespace.clone(),
            annotations: BTreeMap::from([(
                SECRET_SOURCE_ANNOTATION_KEY.to_string(),
                owner.to_string(),
            )]),
            data: secret_data(spec, &credentials)?,
        };
        if existing.is_some() {
            debug!("Replacing secret {namespace}/{}", secret.name);
            self.secrets.replace(&secret).await?;
        } else {
            info!("Creating secret {namespace}/{}", secret.name);
            self.secrets.create(&secret).await?;
        }

        self.updater
            .update_state(selector, SyncState::Synced)
            .await?;
        self.emit(
            selector,
            uid,
            AuditEvent::normal(
                "Synced",
                format!("Secret {} is in sync", spec.target_secret_name),
            ),
        )
        .await;
        Ok(SyncState::Synced)
    }

    /// Client id and secret, `None` when the client, its id or its secret is missing.
    async fn resolve(
        &self,
        spec: &KeycloakClientCredentialSpec,
    ) -> Result<Option<ClientCredentials>, ReconcileError> {
        let scope = Scope::Realm(spec.realm.clone());
        let lookup = Representation::from_fields([("clientId", Some(spec.client_id.as_str()))]);
        let clients = match self
            .identity
            .find(ResourceType::Client, &scope, &lookup)
            .await
        {
            Ok(clients) => clients,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let Some(id) = clients
            .iter()
            .find(|c| c.matches(&lookup))
            .and_then(Representation::id)
        else {
            return Ok(None);
        };
        let secret = match self.identity.client_secret(&spec.realm, id).await {
            Ok(secret) => secret,
            Err(IdentityError::Status { status: 404, .. }) => None,
            Err(e) => return Err(e.into()),
        };
        Ok(secret.map(|client_secret| ClientCredentials {
            client_id: spec.client_id.clone(),
            client_secret,
            realm: spec.realm.clone(),
        }))
    }

    /// Delete exported Secrets whose owning resource is gone.
    pub async fn cleanup(&self) -> Result<CleanupReport, ReconcileError> {
        let kind = Self::kind();
        let transport = self.updater.transport();
        let span = info_span!("reconciler.cleanup", resource.kind = %kind.kind);
        async move {
            let mut targeted = HashSet::new();
            for object in transport.list(&kind).await? {
                let parsed = ManagedObject::<KeycloakClientCredentialSpec>::from_value(&object)?;
                let namespace = parsed.metadata.namespace.clone().unwrap_or_default();
                targeted.insert((namespace, parsed.spec.target_secret_name));
            }

            let mut report = CleanupReport::default();
            for secret in self
                .secrets
                .list_annotated(SECRET_SOURCE_ANNOTATION_KEY)
                .await?
            {
                if targeted.contains(&(secret.namespace.clone(), secret.name.clone())) {
                    continue;
                }
                info!(
                    "Deleting secret {}/{} left behind by {}",
                    secret.namespace,
                    secret.name,
                    secret
                        .annotation(SECRET_SOURCE_ANNOTATION_KEY)
                        .unwrap_or_default()
                );
                self.secrets.delete(&secret.namespace, &secret.name).await?;
                metrics::increment_cleanup_action(&kind.kind, "delete");
                report.deleted += 1;
            }
            Ok(report)
        }
        .instrument(span)
        .await
    }
}
