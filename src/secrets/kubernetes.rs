//! [`SecretStore`] over the core/v1 Secret API.

use super::{ManagedSecret, SecretStore};
use crate::crd::SecretKeyRef;
use crate::error::SecretStoreError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{Api, DeleteParams, ListParams, ObjectMeta, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use tracing::{debug, warn};

const OPAQUE_SECRET_TYPE: &str = "Opaque";

#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
}

impl std::fmt::Debug for KubeSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretStore").finish_non_exhaustive()
    }
}

impl KubeSecretStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn decode(secret: Secret) -> Result<ManagedSecret, SecretStoreError> {
    let name = secret.metadata.name.unwrap_or_default();
    let namespace = secret.metadata.namespace.unwrap_or_default();
    let mut data = BTreeMap::new();
    for (key, ByteString(bytes)) in secret.data.unwrap_or_default() {
        let value = String::from_utf8(bytes).map_err(|_err| SecretStoreError::InvalidUtf8 {
            namespace: namespace.clone(),
            name: name.clone(),
            key: key.clone(),
        })?;
        data.insert(key, value);
    }
    Ok(ManagedSecret {
        name,
        namespace,
        annotations: secret.metadata.annotations.unwrap_or_default(),
        data,
    })
}

fn encode(secret: &ManagedSecret) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(secret.name.clone()),
            namespace: Some(secret.namespace.clone()),
            annotations: Some(secret.annotations.clone()),
            ..ObjectMeta::default()
        },
        type_: Some(OPAQUE_SECRET_TYPE.to_string()),
        data: Some(
            secret
                .data
                .iter()
                .map(|(k, v)| (k.clone(), ByteString(v.as_bytes().to_vec())))
                .collect(),
        ),
        ..Secret::default()
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ManagedSecret>, SecretStoreError> {
        self.api(namespace)
            .get_opt(name)
            .await?
            .map(decode)
            .transpose()
    }

    async fn read_key(&self, key_ref: &SecretKeyRef) -> Result<Option<String>, SecretStoreError> {
        let Some(secret) = self.get(&key_ref.namespace, &key_ref.name).await? else {
            warn!(
                "Secret {}/{} referenced by secretKeyRef does not exist",
                key_ref.namespace, key_ref.name
            );
            return Ok(None);
        };
        let value = secret.data.get(&key_ref.key).cloned();
        if value.is_none() {
            warn!(
                "Secret {}/{} has no key {}",
                key_ref.namespace, key_ref.name, key_ref.key
            );
        }
        Ok(value)
    }

    async fn create(&self, secret: &ManagedSecret) -> Result<(), SecretStoreError> {
        debug!("Creating secret {}/{}", secret.namespace, secret.name);
        self.api(&secret.namespace)
            .create(&PostParams::default(), &encode(secret))
            .await?;
        Ok(())
    }

    async fn replace(&self, secret: &ManagedSecret) -> Result<(), SecretStoreError> {
        debug!("Replacing secret {}/{}", secret.namespace, secret.name);
        self.api(&secret.namespace)
            .replace(&secret.name, &PostParams::default(), &encode(secret))
            .await?;
        Ok(())
    }

    async fn list_annotated(
        &self,
        annotation: &str,
    ) -> Result<Vec<ManagedSecret>, SecretStoreError> {
        // Annotations are not selectable server side
        let secrets = Api::<Secret>::all(self.client.clone())
            .list(&ListParams::default())
            .await?;
        secrets
            .items
            .into_iter()
            .filter(|s| {
                s.metadata
                    .annotations
                    .as_ref()
                    .is_some_and(|a| a.contains_key(annotation))
            })
            .map(decode)
            .collect()
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), SecretStoreError> {
        debug!("Deleting secret {namespace}/{name}");
        match self.api(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
