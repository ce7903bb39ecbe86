//! # Custom Resource Transport
//!
//! Watch/get/list/patch access to the operator's custom resources, plus audit
//! events attached to them. Objects travel as raw JSON so one transport serves
//! every kind; typed parsing happens in the reconcilers.

pub mod kubernetes;

use crate::error::TransportError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use kube::core::{ApiResource, CustomResourceExt, Resource};
use serde_json::Value;
use std::fmt;

pub use self::kubernetes::KubeTransport;

/// Identity of a custom resource type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKind {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
    pub namespaced: bool,
}

impl ResourceKind {
    /// Derive the kind from a `#[derive(CustomResource)]` type.
    #[must_use]
    pub fn of<K>() -> Self
    where
        K: CustomResourceExt + Resource<DynamicType = ()>,
    {
        Self {
            group: K::group(&()).into_owned(),
            version: K::version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
            plural: K::plural(&()).into_owned(),
            namespaced: K::crd().spec.scope == "Namespaced",
        }
    }

    #[must_use]
    pub fn api_version(&self) -> String {
        format!("{}/{}", self.group, self.version)
    }

    #[must_use]
    pub fn api_resource(&self) -> ApiResource {
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.api_version(),
            kind: self.kind.clone(),
            plural: self.plural.clone(),
        }
    }

    #[must_use]
    pub fn selector(&self, name: impl Into<String>, namespace: Option<String>) -> Selector {
        Selector {
            kind: self.clone(),
            name: name.into(),
            namespace: if self.namespaced { namespace } else { None },
        }
    }
}

/// `(group, version, plural, name, namespace?)` of one custom resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selector {
    pub kind: ResourceKind,
    pub name: String,
    pub namespace: Option<String>,
}

impl Selector {
    /// Read name and namespace from a raw object.
    pub fn from_object(kind: &ResourceKind, object: &Value) -> Result<Self, TransportError> {
        let metadata = object.get("metadata");
        let name = metadata
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .ok_or_else(|| TransportError::Malformed {
                name: kind.plural.clone(),
                reason: "object has no metadata.name".to_string(),
            })?;
        let namespace = metadata
            .and_then(|m| m.get("namespace"))
            .and_then(Value::as_str)
            .map(str::to_string);
        if kind.namespaced && namespace.is_none() {
            return Err(TransportError::Malformed {
                name: name.to_string(),
                reason: "namespaced object has no metadata.namespace".to_string(),
            });
        }
        Ok(kind.selector(name, namespace))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind.plural, ns, self.name),
            None => write!(f, "{}/{}", self.kind.plural, self.name),
        }
    }
}

/// Lifecycle phase of a watch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub phase: WatchPhase,
    pub object: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

impl EventType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Warning => "Warning",
        }
    }
}

/// Human-readable audit record attached to a custom resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
}

impl AuditEvent {
    pub fn normal(reason: &str, message: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Normal,
            reason: reason.to_string(),
            message: message.into(),
        }
    }

    pub fn warning(reason: &str, message: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Warning,
            reason: reason.to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait CrTransport: Send + Sync {
    async fn get(&self, selector: &Selector) -> Result<Value, TransportError>;

    /// Every object of `kind`, across all namespaces for namespaced kinds.
    async fn list(&self, kind: &ResourceKind) -> Result<Vec<Value>, TransportError>;

    /// JSON merge patch of the object body.
    async fn patch(&self, selector: &Selector, patch: &Value) -> Result<(), TransportError>;

    /// JSON merge patch of the status subresource.
    async fn patch_status(&self, selector: &Selector, patch: &Value)
        -> Result<(), TransportError>;

    async fn publish_event(
        &self,
        selector: &Selector,
        uid: Option<&str>,
        event: &AuditEvent,
    ) -> Result<(), TransportError>;

    /// Fresh watch from the current state; ends or errors when the connection drops.
    fn watch(&self, kind: &ResourceKind) -> BoxStream<'static, Result<WatchEvent, TransportError>>;
}
