//! Kubernetes API implementation of [`CrTransport`] over `DynamicObject`.

use super::{AuditEvent, CrTransport, ResourceKind, Selector, WatchEvent, WatchPhase};
use crate::constants::OPERATOR_NAME;
use crate::error::TransportError;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
use kube::api::{Api, DynamicObject, ListParams, ObjectMeta, Patch, PatchParams, PostParams};
use kube::Client;
use kube_runtime::watcher;
use serde_json::Value;

/// Namespace receiving audit events of cluster-scoped resources
const CLUSTER_EVENT_NAMESPACE: &str = "default";

#[derive(Clone)]
pub struct KubeTransport {
    client: Client,
}

impl std::fmt::Debug for KubeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeTransport").finish_non_exhaustive()
    }
}

impl KubeTransport {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, kind: &ResourceKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = kind.api_resource();
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }

    fn api_for(&self, selector: &Selector) -> Api<DynamicObject> {
        self.api(&selector.kind, selector.namespace.as_deref())
    }
}

fn to_value(object: &DynamicObject) -> Result<Value, TransportError> {
    serde_json::to_value(object).map_err(|e| TransportError::Malformed {
        name: object.metadata.name.clone().unwrap_or_default(),
        reason: e.to_string(),
    })
}

fn patch_params() -> PatchParams {
    PatchParams::apply(OPERATOR_NAME)
}

#[async_trait]
impl CrTransport for KubeTransport {
    async fn get(&self, selector: &Selector) -> Result<Value, TransportError> {
        match self.api_for(selector).get_opt(&selector.name).await? {
            Some(object) => to_value(&object),
            None => Err(TransportError::NotFound(selector.to_string())),
        }
    }

    async fn list(&self, kind: &ResourceKind) -> Result<Vec<Value>, TransportError> {
        let objects = self.api(kind, None).list(&ListParams::default()).await?;
        objects.items.iter().map(to_value).collect()
    }

    async fn patch(&self, selector: &Selector, patch: &Value) -> Result<(), TransportError> {
        self.api_for(selector)
            .patch(&selector.name, &patch_params(), &Patch::Merge(patch))
            .await?;
        Ok(())
    }

    async fn patch_status(
        &self,
        selector: &Selector,
        patch: &Value,
    ) -> Result<(), TransportError> {
        self.api_for(selector)
            .patch_status(&selector.name, &patch_params(), &Patch::Merge(patch))
            .await?;
        Ok(())
    }

    async fn publish_event(
        &self,
        selector: &Selector,
        uid: Option<&str>,
        event: &AuditEvent,
    ) -> Result<(), TransportError> {
        let namespace = selector
            .namespace
            .clone()
            .unwrap_or_else(|| CLUSTER_EVENT_NAMESPACE.to_string());
        let record = Event {
            metadata: ObjectMeta {
                generate_name: Some(format!("{}.", selector.name)),
                namespace: Some(namespace.clone()),
                ..ObjectMeta::default()
            },
            involved_object: ObjectReference {
                api_version: Some(selector.kind.api_version()),
                kind: Some(selector.kind.kind.clone()),
                name: Some(selector.name.clone()),
                namespace: selector.namespace.clone(),
                uid: uid.map(str::to_string),
                ..ObjectReference::default()
            },
            reason: Some(event.reason.clone()),
            message: Some(event.message.clone()),
            type_: Some(event.event_type.as_str().to_string()),
            count: Some(1),
            source: Some(EventSource {
                component: Some(OPERATOR_NAME.to_string()),
                host: None,
            }),
            reporting_component: Some(OPERATOR_NAME.to_string()),
            ..Event::default()
        };
        Api::<Event>::namespaced(self.client.clone(), &namespace)
            .create(&PostParams::default(), &record)
            .await?;
        Ok(())
    }

    fn watch(&self, kind: &ResourceKind) -> BoxStream<'static, Result<WatchEvent, TransportError>> {
        watcher(self.api(kind, None), watcher::Config::default())
            .filter_map(|event| async move {
                let (phase, object) = match event {
                    Ok(watcher::Event::InitApply(object)) => (WatchPhase::Added, object),
                    Ok(watcher::Event::Apply(object)) => (WatchPhase::Modified, object),
                    Ok(watcher::Event::Delete(object)) => (WatchPhase::Deleted, object),
                    Ok(watcher::Event::Init | watcher::Event::InitDone) => return None,
                    Err(e) => return Some(Err(TransportError::from(e))),
                };
                Some(to_value(&object).map(|object| WatchEvent { phase, object }))
            })
            .boxed()
    }
}
