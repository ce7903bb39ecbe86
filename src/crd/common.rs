//! # Shared CRD Types
//!
//! Spec fields common to every claim/adopt kind, the status block, and schema helpers.

use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Fields every claim/adopt kind carries next to its own lookup fields.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommonSpec {
    /// Realm the resource lives in. For realms this is the realm itself.
    pub realm: String,
    /// Adopt a pre-existing unclaimed resource matching the lookup fields
    #[serde(default = "default_true")]
    pub claim: bool,
    /// Delete the resource when the CR goes away; otherwise only drop the claim
    #[serde(default = "default_true")]
    pub prune: bool,
    /// Adopt by deleting and recreating instead of updating in place
    #[serde(default = "default_false")]
    pub recreate_on_claim: bool,
    /// Keycloak representation merged onto the managed object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub representation: Option<Value>,
}

#[must_use]
pub fn default_true() -> bool {
    true
}

#[must_use]
pub fn default_false() -> bool {
    false
}

/// Synchronisation state reported in `status.state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncState {
    NotSynced,
    OutOfSync,
    Syncing,
    Synced,
    Failed,
}

impl SyncState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotSynced => "not-synced",
            Self::OutOfSync => "out-of-sync",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "sync_state_schema")]
    pub state: Option<SyncState>,
    /// RFC 3339 time of the operator's last status write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_operator_status_update: Option<String>,
}

/// Free-form object kept verbatim by the API server.
pub fn preserve_unknown_fields(_gen: &mut SchemaGenerator) -> Schema {
    schemars::json_schema!({
        "type": "object",
        "nullable": true,
        "x-kubernetes-preserve-unknown-fields": true
    })
}

fn sync_state_schema(_gen: &mut SchemaGenerator) -> Schema {
    // Nullable enum rather than anyOf, which structural schemas reject
    schemars::json_schema!({
        "type": "string",
        "enum": ["not-synced", "out-of-sync", "syncing", "synced", "failed"],
        "nullable": true,
        "description": "Synchronisation state of the resource"
    })
}
