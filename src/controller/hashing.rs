//! # Hash Store
//!
//! Salted fingerprints of custom resource specs.
//!
//! Every status write embeds `fingerprint(spec)` as an annotation. When the watch
//! later delivers that write back, the stored and recomputed fingerprints match and the
//! event is dropped instead of triggering another reconcile.
//!
//! The salt lives in the shared store under [`HASHING_SALT_KEY`]. It is created on
//! first use and cached for the life of the process. Two replicas racing to create it
//! both write, and the last write wins.

use crate::constants::{FINGERPRINT_ANNOTATION_KEY, HASHING_SALT_KEY};
use crate::error::StoreError;
use crate::store::SharedStore;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

/// Copy of `value` with object keys sorted at every level.
#[must_use]
pub fn canonical_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonical_json(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical_json).collect()),
        other => other.clone(),
    }
}

/// Hex SHA-256 of the canonical `{salt, spec}` document.
#[must_use]
pub fn fingerprint_with_salt(salt: &str, spec: &Value) -> String {
    let document = canonical_json(&json!({ "salt": salt, "spec": spec }));
    let digest = Sha256::digest(document.to_string().as_bytes());
    format!("{digest:x}")
}

/// Fingerprint annotation stored on a raw object, if any.
#[must_use]
pub fn stored_fingerprint(object: &Value) -> Option<&str> {
    object
        .pointer("/metadata/annotations")
        .and_then(|a| a.get(FINGERPRINT_ANNOTATION_KEY))
        .and_then(Value::as_str)
}

pub struct HashStore {
    store: Arc<dyn SharedStore>,
    salt: OnceCell<String>,
}

impl std::fmt::Debug for HashStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashStore")
            .field("salt_loaded", &self.salt.initialized())
            .finish_non_exhaustive()
    }
}

impl HashStore {
    #[must_use]
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self {
            store,
            salt: OnceCell::new(),
        }
    }

    /// Process-wide salt, loaded or created on first call.
    pub async fn salt(&self) -> Result<&str, StoreError> {
        let salt = self
            .salt
            .get_or_try_init(|| async {
                if let Some(existing) = self.store.get(HASHING_SALT_KEY).await? {
                    return Ok::<_, StoreError>(existing);
                }
                let generated = uuid::Uuid::new_v4().to_string();
                info!("No hashing salt found in shared store, generating one");
                self.store.set(HASHING_SALT_KEY, &generated).await?;
                Ok(generated)
            })
            .await?;
        Ok(salt.as_str())
    }

    pub async fn fingerprint(&self, spec: &Value) -> Result<String, StoreError> {
        let salt = self.salt().await?;
        Ok(fingerprint_with_salt(salt, spec))
    }

    /// Whether the object's fingerprint annotation matches its current spec.
    pub async fn matches(&self, object: &Value) -> Result<bool, StoreError> {
        let Some(stored) = stored_fingerprint(object) else {
            return Ok(false);
        };
        let spec = object.get("spec").cloned().unwrap_or(Value::Null);
        Ok(self.fingerprint(&spec).await? == stored)
    }

    pub async fn close(&self) {
        self.store.close().await;
    }
}
