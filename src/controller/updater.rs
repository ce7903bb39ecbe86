//! # Status / Annotation Updater
//!
//! The only path through which the operator writes to its own custom resources.
//!
//! Each write fingerprints the resulting spec and stores it as an annotation so the
//! watch can recognise the echo. Body and status are patched separately because status
//! patches do not carry metadata or spec changes.

use super::hashing::HashStore;
use crate::constants::FINGERPRINT_ANNOTATION_KEY;
use crate::crd::SyncState;
use crate::error::ReconcileError;
use crate::transport::{AuditEvent, CrTransport, Selector};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Partial update of a custom resource. Fields are shallow-merged over the current values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrUpdate {
    pub status: Option<Map<String, Value>>,
    pub spec: Option<Map<String, Value>>,
}

impl CrUpdate {
    #[must_use]
    pub fn status(status: Map<String, Value>) -> Self {
        Self {
            status: Some(status),
            spec: None,
        }
    }
}

#[derive(Clone)]
pub struct CrUpdater {
    transport: Arc<dyn CrTransport>,
    hashes: Arc<HashStore>,
}

impl std::fmt::Debug for CrUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrUpdater").finish_non_exhaustive()
    }
}

fn shallow_merge(current: Option<&Value>, partial: Option<&Map<String, Value>>) -> Value {
    let mut merged = match current {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    if let Some(partial) = partial {
        for (key, value) in partial {
            merged.insert(key.clone(), value.clone());
        }
    }
    Value::Object(merged)
}

impl CrUpdater {
    #[must_use]
    pub fn new(transport: Arc<dyn CrTransport>, hashes: Arc<HashStore>) -> Self {
        Self { transport, hashes }
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<dyn CrTransport> {
        &self.transport
    }

    #[must_use]
    pub fn hashes(&self) -> &Arc<HashStore> {
        &self.hashes
    }

    /// Merge `update` over the current object, refresh the fingerprint and write both
    /// the body and the status subresource.
    pub async fn update_cr(
        &self,
        selector: &Selector,
        update: CrUpdate,
    ) -> Result<(), ReconcileError> {
        let current = self.transport.get(selector).await?;
        let spec = shallow_merge(current.get("spec"), update.spec.as_ref());
        let status = shallow_merge(current.get("status"), update.status.as_ref());
        let fingerprint = self.hashes.fingerprint(&spec).await?;

        let mut body = json!({
            "metadata": {"annotations": {FINGERPRINT_ANNOTATION_KEY: fingerprint}},
            "status": status,
        });
        if update.spec.is_some() {
            body["spec"] = spec;
        }
        debug!("Patching {selector}");
        self.transport.patch(selector, &body).await?;
        self.transport
            .patch_status(selector, &json!({ "status": status }))
            .await?;
        Ok(())
    }

    /// Write `status.state` together with the operator's status timestamp.
    pub async fn update_state(
        &self,
        selector: &Selector,
        state: SyncState,
    ) -> Result<(), ReconcileError> {
        let mut status = Map::new();
        status.insert("state".to_string(), json!(state));
        status.insert(
            "lastOperatorStatusUpdate".to_string(),
            json!(chrono::Utc::now().to_rfc3339()),
        );
        self.update_cr(selector, CrUpdate::status(status)).await
    }

    pub async fn log_event(
        &self,
        selector: &Selector,
        uid: Option<&str>,
        event: &AuditEvent,
    ) -> Result<(), ReconcileError> {
        self.transport.publish_event(selector, uid, event).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shallow_merge_replaces_top_level_fields_only() {
        let current = json!({"state": "synced", "nested": {"a": 1, "b": 2}});
        let mut partial = Map::new();
        partial.insert("nested".to_string(), json!({"a": 3}));
        let merged = shallow_merge(Some(&current), Some(&partial));
        assert_eq!(merged, json!({"state": "synced", "nested": {"a": 3}}));
    }

    #[test]
    fn test_shallow_merge_without_current() {
        let merged = shallow_merge(None, None);
        assert_eq!(merged, json!({}));
    }
}
