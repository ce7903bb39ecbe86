//! # Secret Store
//!
//! Kubernetes Secrets read by client reconcilers (`valueFrom.secretKeyRef`) and written
//! by the client credential export.

pub mod kubernetes;

use crate::crd::SecretKeyRef;
use crate::error::SecretStoreError;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub use self::kubernetes::KubeSecretStore;

/// Decoded view of a Kubernetes Secret.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagedSecret {
    pub name: String,
    pub namespace: String,
    pub annotations: BTreeMap<String, String>,
    /// Plain-text values; encoding happens at the API boundary
    pub data: BTreeMap<String, String>,
}

impl ManagedSecret {
    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str)
        -> Result<Option<ManagedSecret>, SecretStoreError>;

    /// Value behind a key reference; `None` when the Secret or the key is missing.
    async fn read_key(&self, key_ref: &SecretKeyRef) -> Result<Option<String>, SecretStoreError>;

    async fn create(&self, secret: &ManagedSecret) -> Result<(), SecretStoreError>;

    async fn replace(&self, secret: &ManagedSecret) -> Result<(), SecretStoreError>;

    /// Every Secret in the cluster carrying `annotation`, whatever its value.
    async fn list_annotated(&self, annotation: &str)
        -> Result<Vec<ManagedSecret>, SecretStoreError>;

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), SecretStoreError>;
}
