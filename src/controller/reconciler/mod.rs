//! # Reconciler
//!
//! Claim/adopt reconciliation shared by every identity-service kind.
//!
//! A kind plugs into [`ClaimReconciler`] by implementing [`ManagedSpec`]: how to look
//! the object up, which fields to send on create and update, and optional hooks run
//! around the converge step.
//!
//! ## Reconciliation Flow
//!
//! 1. `status.state` ← `syncing`
//! 2. Check the parent realm exists (skipped for realms)
//! 3. Find the object by exact match on the lookup fields
//! 4. Create it when absent, with the claim marker and spec snapshot
//! 5. Claim check: fail, recreate, or adopt in place depending on `claim`/`recreateOnClaim`
//! 6. Converge with an unconditional update
//! 7. Kind hook (client scope bindings, realm partial imports)
//! 8. `status.state` ← `synced`; any error ends in `failed` instead

pub mod attributes;
pub mod claim;
pub mod kinds;
pub mod scopes;

use crate::crd::{CommonSpec, ResourceStatus};
use crate::error::ReconcileError;
use crate::identity::{Attributes, IdentityApi, Representation, ResourceType, Scope};
use crate::secrets::SecretStore;
use crate::transport::ResourceKind;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use claim::ClaimReconciler;

/// What a converge hook may touch.
pub struct ConvergeContext<'a> {
    pub identity: &'a dyn IdentityApi,
    pub secrets: &'a dyn SecretStore,
    pub scope: &'a Scope,
    /// Key of the managed object, see [`ResourceType::key_field`]
    pub key: &'a str,
}

impl std::fmt::Debug for ConvergeContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvergeContext")
            .field("scope", &self.scope)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Per-kind capabilities plugged into [`ClaimReconciler`].
#[async_trait]
pub trait ManagedSpec: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const RESOURCE_TYPE: ResourceType;

    /// Fields of the identity-service object compared during lookup.
    const LOOKUP_KEYS: &'static [&'static str];

    fn kind() -> ResourceKind;

    fn common(&self) -> &CommonSpec;

    fn scope(&self) -> Scope {
        Scope::Realm(self.common().realm.clone())
    }

    /// Exact-match filter over [`Self::LOOKUP_KEYS`].
    fn lookup(&self) -> Representation;

    fn create_fields(&self) -> Representation {
        self.lookup()
    }

    fn update_fields(&self) -> Representation {
        self.create_fields()
    }

    /// Name used in logs and events.
    fn human_readable(&self) -> String;

    fn default_attributes() -> Attributes {
        Attributes::new()
    }

    /// Extra fields for the converge update.
    async fn converge_extras(
        &self,
        _ctx: &ConvergeContext<'_>,
    ) -> Result<Representation, ReconcileError> {
        Ok(Representation::new())
    }

    /// Runs after a successful converge update.
    async fn after_converge(&self, _ctx: &ConvergeContext<'_>) -> Result<(), ReconcileError> {
        Ok(())
    }
}

/// Typed view of a raw custom resource.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManagedObject<S> {
    pub metadata: ObjectMeta,
    pub spec: S,
    #[serde(default)]
    pub status: Option<ResourceStatus>,
}

impl<S: DeserializeOwned> ManagedObject<S> {
    pub fn from_value(object: &Value) -> Result<Self, ReconcileError> {
        Ok(Self::deserialize(object)?)
    }

    #[must_use]
    pub fn uid(&self) -> Option<&str> {
        self.metadata.uid.as_deref()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}
