//! # Orphan Reaper
//!
//! Periodic sweep enforcing "nothing claimed by the operator exists without a live CR".
//!
//! Every realm is scanned, not only those referenced by CRs, since the realm named by
//! a deleted CR may be gone too. For each claimed object no CR references, the last
//! applied spec is recovered from the snapshot attribute and decides the outcome:
//! `prune: true` deletes the object, `prune: false` disowns it by removing every
//! operator attribute. `claim` plays no part here.
//!
//! A CR that cannot be parsed aborts the sweep, because its object would otherwise
//! look orphaned and be deleted.

use super::hashing::canonical_json;
use super::reconciler::attributes::{disown_patch, is_claimed, reserved_value, ReservedKey};
use super::reconciler::{ManagedObject, ManagedSpec};
use crate::crd::default_true;
use crate::error::{CleanupError, ReconcileError};
use crate::identity::{Attributes, IdentityApi, Representation, ResourceType, Scope};
use crate::observability::metrics;
use crate::transport::CrTransport;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, info, info_span, warn, Instrument};

/// Counts of what one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted: usize,
    pub disowned: usize,
    pub skipped: usize,
}

/// The part of a recovered spec cleanup needs.
#[derive(Debug, Deserialize)]
struct RecoveredSpec {
    #[serde(default = "default_true")]
    prune: bool,
}

fn recover_spec(attributes: &Attributes, resource: &str) -> Result<RecoveredSpec, CleanupError> {
    let raw = reserved_value(attributes, ReservedKey::SpecSnapshot).ok_or_else(|| {
        CleanupError::MalformedRecoveredSpec {
            resource: resource.to_string(),
            reason: "no spec snapshot attribute".to_string(),
        }
    })?;
    serde_json::from_str(&raw).map_err(|e| CleanupError::MalformedRecoveredSpec {
        resource: resource.to_string(),
        reason: e.to_string(),
    })
}

/// `(scope, canonical lookup)` identifying an object within its kind.
fn reference(scope: &Scope, lookup: Representation) -> (Scope, String) {
    (scope.clone(), canonical_json(&lookup.into_value()).to_string())
}

async fn all_scopes(
    resource: ResourceType,
    identity: &dyn IdentityApi,
) -> Result<Vec<Scope>, ReconcileError> {
    if resource == ResourceType::Realm {
        return Ok(vec![Scope::Root]);
    }
    let realms = identity
        .find(ResourceType::Realm, &Scope::Root, &Representation::new())
        .await?;
    Ok(realms
        .iter()
        .filter_map(|r| r.get_str("realm"))
        .map(|realm| Scope::Realm(realm.to_string()))
        .collect())
}

/// Delete or disown every claimed object of kind `S` that no CR references.
pub async fn sweep_orphans<S: ManagedSpec>(
    transport: &dyn CrTransport,
    identity: &dyn IdentityApi,
) -> Result<CleanupReport, ReconcileError> {
    let kind = S::kind();
    let span = info_span!("reconciler.cleanup", resource.kind = %kind.kind);
    async move {
        let objects = transport.list(&kind).await?;
        let mut referenced = HashSet::new();
        for object in &objects {
            let parsed = ManagedObject::<S>::from_value(object)?;
            referenced.insert(reference(&parsed.spec.scope(), parsed.spec.lookup()));
        }
        debug!("{} {} resources reference identity objects", referenced.len(), kind.kind);

        let resource_type = S::RESOURCE_TYPE;
        let mut report = CleanupReport::default();
        for scope in all_scopes(resource_type, identity).await? {
            let existing = identity
                .find(resource_type, &scope, &Representation::new())
                .await?;
            for object in existing {
                let attributes = object.attributes();
                if !is_claimed(&attributes)
                    || referenced.contains(&reference(&scope, object.project(S::LOOKUP_KEYS)))
                {
                    continue;
                }
                let Some(key) = resource_type.key_of(&object) else {
                    continue;
                };
                let description = format!("{resource_type} {key} in {scope}");
                let recovered = match recover_spec(&attributes, &description) {
                    Ok(recovered) => recovered,
                    Err(e) => {
                        warn!("{e}");
                        metrics::increment_cleanup_action(&kind.kind, "skip");
                        report.skipped += 1;
                        continue;
                    }
                };
                if recovered.prune {
                    info!("Deleting lingering managed {description}");
                    identity.delete(resource_type, &scope, &key).await?;
                    metrics::increment_cleanup_action(&kind.kind, "delete");
                    report.deleted += 1;
                } else {
                    info!("Dropping claim of {description}");
                    let mut body = Representation::new();
                    body.set_attribute_patch(&disown_patch(&attributes));
                    identity.update(resource_type, &scope, &key, &body).await?;
                    metrics::increment_cleanup_action(&kind.kind, "disown");
                    report.disowned += 1;
                }
            }
        }
        Ok(report)
    }
    .instrument(span)
    .await
}
