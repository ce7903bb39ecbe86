//! Claim/adopt reconciliation of one custom resource.

use super::attributes::{adoption_attributes, creation_attributes, is_claimed, merge_attributes};
use super::{ConvergeContext, ManagedObject, ManagedSpec};
use crate::controller::updater::CrUpdater;
use crate::crd::SyncState;
use crate::error::{IdentityError, ReconcileError};
use crate::identity::{Attributes, IdentityApi, Representation, ResourceType, Scope};
use crate::observability::metrics;
use crate::secrets::SecretStore;
use crate::transport::{AuditEvent, Selector};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Outcome of locating the managed object.
struct Located {
    key: String,
    current: Representation,
}

pub struct ClaimReconciler<S> {
    identity: Arc<dyn IdentityApi>,
    secrets: Arc<dyn SecretStore>,
    updater: CrUpdater,
    spec: PhantomData<fn() -> S>,
}

impl<S> std::fmt::Debug for ClaimReconciler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimReconciler").finish_non_exhaustive()
    }
}

impl<S: ManagedSpec> ClaimReconciler<S> {
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
            spec: PhantomData,
        }
    }

    #[must_use]
    pub fn identity(&self) -> &Arc<dyn IdentityApi> {
        &self.identity
    }

    #[must_use]
    pub fn updater(&self) -> &CrUpdater {
        &self.updater
    }

    /// Reconcile one object. Never fails: errors end in `status.state = failed`.
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
                Ok(()) => SyncState::Synced,
                Err(e) => {
                    error!("Error reconciling {selector}: {e}");
                    self.mark_failed(selector, uid, &e).await;
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

    async fn mark_failed(&self, selector: &Selector, uid: Option<&str>, cause: &ReconcileError) {
        if let Err(e) = self.updater.update_state(selector, SyncState::Failed).await {
            error!("Could not mark {selector} as failed: {e}");
        }
        self.emit(selector, uid, AuditEvent::warning("Failed", cause.to_string()))
            .await;
    }

    /// Audit events are best effort.
    async fn emit(&self, selector: &Selector, uid: Option<&str>, event: AuditEvent) {
        if let Err(e) = self.updater.log_event(selector, uid, &event).await {
            warn!("Could not publish {} event for {selector}: {e}", event.reason);
        }
    }

    async fn try_reconcile(&self, object: &Value, selector: &Selector) -> Result<(), ReconcileError> {
        self.updater
            .update_state(selector, SyncState::Syncing)
            .await?;
        let parsed = ManagedObject::<S>::from_value(object)?;
        let uid = parsed.uid();
        let spec = &parsed.spec;
        let scope = spec.scope();
        let name = spec.human_readable();
        self.emit(
            selector,
            uid,
            AuditEvent::normal("Syncing", format!("Syncing {} {name}", S::RESOURCE_TYPE)),
        )
        .await;

        if let Some(realm) = scope.realm() {
            if self
                .identity
                .find_one(ResourceType::Realm, &Scope::Root, realm)
                .await?
                .is_none()
            {
                return Err(ReconcileError::ParentScopeMissing(realm.to_string()));
            }
        }

        let snapshot = serde_json::to_string(spec)?;
        let mut located = match self.find(spec, &scope).await? {
            Some(found) => found,
            None => {
                info!("Creating and claiming {} {name} in {scope}", S::RESOURCE_TYPE);
                self.create(spec, &scope, &snapshot).await?
            }
        };

        let mut attributes = located.current.attributes();
        if !is_claimed(&attributes) {
            info!("{} {name} in {scope} is unclaimed", S::RESOURCE_TYPE);
            let common = spec.common();
            if !common.claim {
                return Err(ReconcileError::Unclaimable(format!(
                    "{} {name} in {scope}",
                    S::RESOURCE_TYPE
                )));
            }
            if common.recreate_on_claim {
                info!("Recreating and claiming {} {name} in {scope}", S::RESOURCE_TYPE);
                self.identity
                    .delete(S::RESOURCE_TYPE, &scope, &located.key)
                    .await?;
                located = self.create(spec, &scope, &snapshot).await?;
                attributes = located.current.attributes();
                self.emit(
                    selector,
                    uid,
                    AuditEvent::normal("Recreated", format!("Recreated and claimed {name}")),
                )
                .await;
            } else {
                info!("Claiming {} {name} in {scope}", S::RESOURCE_TYPE);
                attributes = adoption_attributes(&attributes);
                let mut body = spec.update_fields();
                for field in S::RESOURCE_TYPE.immutable_fields() {
                    body.remove(field);
                }
                body.set_attributes(&attributes);
                self.identity
                    .update(S::RESOURCE_TYPE, &scope, &located.key, &body)
                    .await?;
                self.emit(
                    selector,
                    uid,
                    AuditEvent::normal("Claimed", format!("Claimed existing {name}")),
                )
                .await;
            }
        }

        let ctx = ConvergeContext {
            identity: self.identity.as_ref(),
            secrets: self.secrets.as_ref(),
            scope: &scope,
            key: &located.key,
        };
        debug!("Performing update for {} {name} in {scope}", S::RESOURCE_TYPE);
        let body = self
            .converge_body(spec, &ctx, &attributes, &snapshot)
            .await?;
        self.identity
            .update(S::RESOURCE_TYPE, &scope, &located.key, &body)
            .await?;
        spec.after_converge(&ctx).await?;

        self.updater
            .update_state(selector, SyncState::Synced)
            .await?;
        self.emit(
            selector,
            uid,
            AuditEvent::normal("Synced", format!("{} {name} is in sync", S::RESOURCE_TYPE)),
        )
        .await;
        Ok(())
    }

    async fn find(&self, spec: &S, scope: &Scope) -> Result<Option<Located>, ReconcileError> {
        let lookup = spec.lookup();
        let candidates = self.identity.find(S::RESOURCE_TYPE, scope, &lookup).await?;
        let Some(current) = candidates.into_iter().find(|c| c.matches(&lookup)) else {
            return Ok(None);
        };
        let key = S::RESOURCE_TYPE
            .key_of(&current)
            .ok_or_else(|| IdentityError::MissingId(spec.human_readable()))?;
        Ok(Some(Located { key, current }))
    }

    async fn create(
        &self,
        spec: &S,
        scope: &Scope,
        snapshot: &str,
    ) -> Result<Located, ReconcileError> {
        let mut body = spec.create_fields();
        if let Some(representation) = representation_of(spec) {
            body.overlay(&representation);
        }
        body.set_attributes(&creation_attributes(&S::default_attributes(), snapshot));
        let key = self.identity.create(S::RESOURCE_TYPE, scope, &body).await?;
        let current = self
            .identity
            .find_one(S::RESOURCE_TYPE, scope, &key)
            .await?
            .ok_or_else(|| IdentityError::Vanished(spec.human_readable()))?;
        Ok(Located { key, current })
    }

    async fn converge_body(
        &self,
        spec: &S,
        ctx: &ConvergeContext<'_>,
        current: &Attributes,
        snapshot: &str,
    ) -> Result<Representation, ReconcileError> {
        let mut body = spec.update_fields();
        if let Some(mut representation) = representation_of(spec) {
            for field in S::RESOURCE_TYPE.immutable_fields() {
                representation.remove(field);
            }
            body.overlay(&representation);
        }
        body.overlay(&spec.converge_extras(ctx).await?);
        for field in S::RESOURCE_TYPE.immutable_fields() {
            body.remove(field);
        }
        body.set_attributes(&merge_attributes(
            &S::default_attributes(),
            current,
            snapshot,
        ));
        Ok(body)
    }
}

/// The spec's representation without its `attributes`, which the operator owns.
fn representation_of<S: ManagedSpec>(spec: &S) -> Option<Representation> {
    let mut representation = spec
        .common()
        .representation
        .clone()
        .and_then(Representation::from_value)?;
    representation.remove("attributes");
    Some(representation)
}
